//! Token-level rendering: assemble a generator for one token and run it.

use std::path::Path;

use crate::assemble::{assemble, GeneratorSpec, TokenData};
use crate::library::LibraryBundle;
use crate::window::{compute_window_size, DEFAULT_LONG_EDGE};
use crate::{orchestrator, RenderOptions, Result};

/// Run the generator for `token` and return the text it leaves in the body
/// (typically a JSON features object).
pub fn render_features(
    spec: &GeneratorSpec,
    token: &TokenData,
    bundle: &LibraryBundle,
    options: &RenderOptions,
) -> Result<String> {
    let files = assemble(spec, token, bundle)?;
    orchestrator::eval_untrusted_html(files, options)
}

/// Screenshot the generator for `token` into `output`.
///
/// The window is sized from the generator's aspect ratio with a
/// [`DEFAULT_LONG_EDGE`] long side, overriding `options.window_size`.
pub fn render_image(
    spec: &GeneratorSpec,
    token: &TokenData,
    bundle: &LibraryBundle,
    output: &Path,
    options: &RenderOptions,
) -> Result<()> {
    let window = compute_window_size(spec.aspect_ratio, DEFAULT_LONG_EDGE)?;
    let files = assemble(spec, token, bundle)?;
    let options = options.clone().with_window_size(window);
    orchestrator::screenshot_untrusted_html(files, output, &options)
}
