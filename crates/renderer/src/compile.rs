use crate::error::ProgramError;

/// Pass-through vertex stage feeding the full-viewport quad.
pub const VERTEX_SHADER: &str = "#version 300 es
in vec2 position;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
}
";

pub const POSITION_ATTRIBUTE: &str = "position";

/// Clip-space corners drawn as a 4-vertex triangle strip.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

/// Marker inside the wrapper template that receives the shader body.
pub const WRAPPER_MARKER: &str = "//$REPLACE$";

/// Splices `body` into `template` at the first [`WRAPPER_MARKER`].
///
/// This is a literal replacement of one occurrence; any later markers (or
/// marker-looking text inside `body`) are left alone.
pub fn wrap_fragment(template: &str, body: &str) -> Result<String, ProgramError> {
    if !template.contains(WRAPPER_MARKER) {
        return Err(ProgramError::MissingMarker {
            marker: WRAPPER_MARKER,
        });
    }
    Ok(template.replacen(WRAPPER_MARKER, body, 1))
}

/// Extracts the 1-based source line from a driver info log.
///
/// Understands the Mesa/ANGLE `0:LINE:` form and the NVIDIA `0(LINE)` form.
pub fn error_line(log: &str) -> Option<usize> {
    log.split_whitespace().find_map(|token| {
        if let Some(rest) = token.strip_prefix("0:") {
            return rest.split(':').next()?.parse().ok();
        }
        let inner = token.strip_prefix("0(")?;
        inner.split(')').next()?.parse().ok()
    })
}

/// Renders `radius` lines either side of `line`, marking the failing one.
pub fn excerpt(source: &str, line: usize, radius: usize) -> Option<String> {
    let total = source.lines().count();
    if line == 0 || line > total {
        return None;
    }
    let first = line.saturating_sub(radius).max(1);
    let last = (line + radius).min(total);
    let rendered = source
        .lines()
        .enumerate()
        .map(|(index, text)| (index + 1, text))
        .filter(|(number, _)| (first..=last).contains(number))
        .map(|(number, text)| {
            let marker = if number == line { '>' } else { ' ' };
            format!("{marker}{number:>4} | {text}")
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(rendered)
}

pub(crate) fn excerpt_for_log(source: &str, log: &str) -> Option<String> {
    excerpt(source, error_line(log)?, 2)
}
