//! Per-call composition: serve the files, run the sandbox, extract the
//! artifact, stop the server.
//!
//! The server is owned by a [`FileServer`] guard, so it is stopped on every
//! path out of these functions, including `?` returns from the runner and
//! from body extraction. The browser has always exited (or been killed on
//! timeout) before the guard is released.

use std::path::Path;

use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::assemble::VirtualFileSet;
use crate::runner;
use crate::server::FileServer;
use crate::{Error, RenderOptions, Result};

/// Load `files` in the sandbox and return the text content of the rendered
/// document's `<body>`.
pub fn eval_untrusted_html(files: VirtualFileSet, options: &RenderOptions) -> Result<String> {
    options.validate()?;
    debug!(
        "eval: {} files, {} bytes, digest {}",
        files.len(),
        files.total_bytes(),
        files.digest()
    );
    let server = FileServer::start(files)?;
    let dom = runner::run_eval(server.port(), options)?;
    let text = extract_body_text(&dom)?;
    server.stop();
    Ok(text)
}

/// Load `files` in the sandbox and write a screenshot to `output`, using
/// `options.window_size` as the browser window.
pub fn screenshot_untrusted_html(
    files: VirtualFileSet,
    output: &Path,
    options: &RenderOptions,
) -> Result<()> {
    options.validate()?;
    debug!(
        "screenshot: {} files, digest {}, window {} -> {}",
        files.len(),
        files.digest(),
        options.window_size,
        output.display()
    );
    let server = FileServer::start(files)?;
    runner::run_screenshot(server.port(), options, options.window_size, output)?;
    server.stop();
    Ok(())
}

/// Elements whose contents never render as text
const NON_RENDERED: &[&str] = &["script", "style", "noscript", "template"];

/// Rendered text of the first `<body>` element of a serialized DOM: every
/// text node except those inside `<script>`, `<style>`, `<noscript>` and
/// `<template>`.
///
/// The HTML parser synthesizes a body for any non-empty document, so a
/// missing body means the dump was not a document at all (for example empty
/// output).
pub fn extract_body_text(dom: &str) -> Result<String> {
    if dom.trim().is_empty() {
        return Err(Error::MalformedOutput("sandbox produced no DOM output".into()));
    }
    let document = Html::parse_document(dom);
    let body_sel = Selector::parse("body")
        .map_err(|e| Error::MalformedOutput(format!("body selector: {:?}", e)))?;

    document
        .select(&body_sel)
        .next()
        .map(|body| {
            let mut text = String::new();
            push_rendered_text(body, &mut text);
            text
        })
        .ok_or_else(|| Error::MalformedOutput("no body element in DOM output".into()))
}

fn push_rendered_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            if !NON_RENDERED.contains(&el.value().name()) {
                push_rendered_text(el, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_body_text_only() {
        let dom = "<html><head><title>T</title></head><body><div>{\"a\":</div><span>1}</span></body></html>";
        assert_eq!(extract_body_text(dom).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn script_and_style_text_is_not_rendered() {
        let dom = "<body>x<script>var y = 1;</script><style>p{margin:0}</style><div>z<noscript>n</noscript></div></body>";
        assert_eq!(extract_body_text(dom).unwrap(), "xz");
    }

    #[test]
    fn generated_page_yields_only_what_the_generator_added() {
        // dump of an assembled entry document after its script appended output
        let dom = "<html><head><script>window.tokenData = {};</script></head><body>\n\
<script src=\"/main.js\"></script>\n<style>html,body{margin:0}canvas{object-fit:contain}</style>\n\
{\"a\":1}</body></html>";
        assert_eq!(extract_body_text(dom).unwrap().trim(), "{\"a\":1}");
    }

    #[test]
    fn empty_output_is_malformed() {
        assert!(matches!(extract_body_text(""), Err(Error::MalformedOutput(_))));
        assert!(matches!(extract_body_text("  \n"), Err(Error::MalformedOutput(_))));
    }

    #[test]
    fn fragments_get_an_implied_body() {
        assert_eq!(extract_body_text("hello").unwrap(), "hello");
    }
}
