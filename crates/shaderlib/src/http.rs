use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

use crate::{
    non_empty, validate_name, ShaderSourceService, SourceError, LIST_ENDPOINT, SHADERS_DIR,
    WRAPPER_PATH,
};

/// Client for the playground's static file server.
#[derive(Debug, Clone)]
pub struct HttpShaderSource {
    http: Client,
    base: Url,
}

impl HttpShaderSource {
    pub fn new(base: &str) -> Result<Self, SourceError> {
        let mut base = Url::parse(base).map_err(|_| SourceError::InvalidUrl(base.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(SourceError::InvalidUrl(base.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder().build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn shader_url(&self, name: &str) -> Result<Url, SourceError> {
        validate_name(name)?;
        self.join(&format!("{SHADERS_DIR}/{name}"))
    }

    fn join(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path)
            .map_err(|_| SourceError::InvalidUrl(format!("{}{path}", self.base)))
    }

    fn get_text(&self, url: Url) -> Result<String, SourceError> {
        debug!(%url, "fetching");
        let response = self.http.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        non_empty(response.text()?, url.to_string())
    }
}

impl ShaderSourceService for HttpShaderSource {
    fn fetch_shader_source(&self, name: &str) -> Result<String, SourceError> {
        let url = self.shader_url(name)?;
        match self.get_text(url) {
            Err(SourceError::Status { status: 404, .. }) => {
                Err(SourceError::NotFound(name.to_string()))
            }
            other => other,
        }
    }

    fn fetch_shader_list(&self) -> Result<Vec<String>, SourceError> {
        let body = self.get_text(self.join(LIST_ENDPOINT)?)?;
        Ok(serde_json::from_str(&body)?)
    }

    fn fetch_wrapper_template(&self) -> Result<String, SourceError> {
        self.get_text(self.join(WRAPPER_PATH)?)
    }
}
