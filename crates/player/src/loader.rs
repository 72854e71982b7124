//! Background shader fetches.
//!
//! Each request runs on its own worker thread: fetch the body, fetch the
//! wrapper template, substitute. The finished fragment source comes back over
//! a channel and is applied on the render thread by whoever drains it. Nothing
//! here touches GL.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use renderer::{wrap_fragment, ProgramError};
use shaderlib::{ShaderSourceService, SourceError};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Wrap(#[from] ProgramError),
    #[error("failed to start fetch worker: {0}")]
    Spawn(String),
}

/// A request tagged with the player's selection generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub player_id: String,
    pub generation: u64,
    pub shader: String,
}

#[derive(Debug)]
pub struct FetchCompletion {
    pub ticket: FetchTicket,
    /// Wrapped fragment source ready for `load_shader`.
    pub result: Result<String, FetchError>,
}

pub struct ShaderLoader {
    source: Arc<dyn ShaderSourceService>,
    tx: Sender<FetchCompletion>,
    rx: Receiver<FetchCompletion>,
}

impl ShaderLoader {
    pub fn new(source: Arc<dyn ShaderSourceService>) -> Self {
        let (tx, rx) = unbounded();
        Self { source, tx, rx }
    }

    pub fn source(&self) -> &Arc<dyn ShaderSourceService> {
        &self.source
    }

    pub fn request(&self, ticket: FetchTicket) {
        debug!(
            player = %ticket.player_id,
            shader = %ticket.shader,
            generation = ticket.generation,
            "queueing shader fetch"
        );
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("fetch-{}", ticket.shader))
            .spawn({
                let ticket = ticket.clone();
                move || {
                    let result = fetch_wrapped(source.as_ref(), &ticket.shader);
                    let _ = tx.send(FetchCompletion { ticket, result });
                }
            });
        if let Err(err) = spawned {
            let _ = self.tx.send(FetchCompletion {
                ticket,
                result: Err(FetchError::Spawn(err.to_string())),
            });
        }
    }

    /// Completions that have arrived so far, without blocking.
    pub fn drain(&self) -> Vec<FetchCompletion> {
        self.rx.try_iter().collect()
    }

    /// Blocks up to `timeout` for the next completion.
    pub fn wait(&self, timeout: Duration) -> Option<FetchCompletion> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn shader_list(&self) -> Result<Vec<String>, SourceError> {
        self.source.fetch_shader_list()
    }
}

fn fetch_wrapped(source: &dyn ShaderSourceService, shader: &str) -> Result<String, FetchError> {
    let body = source.fetch_shader_source(shader)?;
    let template = source.fetch_wrapper_template()?;
    Ok(wrap_fragment(&template, &body)?)
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    pub const WRAPPER: &str = "#version 300 es
precision highp float;
uniform vec2 iResolution;
uniform float iTime;
uniform sampler2D iChannel0;
uniform vec4 iCurrentCursor;
uniform vec4 iPreviousCursor;
uniform vec4 iCurrentCursorColor;
uniform float iTimeCursorChange;
out vec4 outColor;
//$REPLACE$
void main() { mainImage(outColor, gl_FragCoord.xy); }
";

    /// In-memory shader source.
    #[derive(Default)]
    pub struct FakeSource {
        pub shaders: Mutex<BTreeMap<String, String>>,
    }

    impl FakeSource {
        pub fn with(shaders: &[(&str, &str)]) -> Arc<Self> {
            let map = shaders
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect();
            Arc::new(Self {
                shaders: Mutex::new(map),
            })
        }
    }

    impl ShaderSourceService for FakeSource {
        fn fetch_shader_source(&self, name: &str) -> Result<String, SourceError> {
            let shaders = self.shaders.lock().unwrap();
            shaders
                .get(name)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(name.to_string()))
        }

        fn fetch_shader_list(&self) -> Result<Vec<String>, SourceError> {
            Ok(self.shaders.lock().unwrap().keys().cloned().collect())
        }

        fn fetch_wrapper_template(&self) -> Result<String, SourceError> {
            Ok(WRAPPER.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSource;
    use super::*;

    fn ticket(shader: &str, generation: u64) -> FetchTicket {
        FetchTicket {
            player_id: "p1".into(),
            generation,
            shader: shader.into(),
        }
    }

    #[test]
    fn delivers_wrapped_fragment() {
        let loader = ShaderLoader::new(FakeSource::with(&[(
            "a.glsl",
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }",
        )]));
        loader.request(ticket("a.glsl", 3));
        let completion = loader.wait(Duration::from_secs(5)).expect("completion");
        assert_eq!(completion.ticket.generation, 3);
        let fragment = completion.result.unwrap();
        assert!(fragment.contains("c = vec4(1.0);"));
        assert!(!fragment.contains("//$REPLACE$"));
    }

    #[test]
    fn missing_shader_is_reported_not_panicked() {
        let loader = ShaderLoader::new(FakeSource::with(&[]));
        loader.request(ticket("gone.glsl", 1));
        let completion = loader.wait(Duration::from_secs(5)).expect("completion");
        assert!(matches!(
            completion.result,
            Err(FetchError::Source(SourceError::NotFound(_)))
        ));
        assert!(loader.drain().is_empty());
    }
}
