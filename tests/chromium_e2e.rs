//! End-to-end renders against a real Chromium.
//!
//! Run with `cargo test -- --ignored`; set `GENSANDBOX_CHROMIUM` when the
//! browser is not on `PATH` as `chromium`.

use std::path::PathBuf;
use std::time::Duration;

use gensandbox::{
    compute_window_size, eval_untrusted_html, render_features, render_image,
    screenshot_untrusted_html, GeneratorSpec, LibraryBundle, RenderOptions, TokenData,
    VirtualFileSet, DEFAULT_LONG_EDGE,
};
use serde_json::json;

const PNG_MAGIC: &[u8] = b"\x89PNG";

fn options() -> RenderOptions {
    let binary = std::env::var_os("GENSANDBOX_CHROMIUM")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(gensandbox::DEFAULT_BINARY));
    RenderOptions {
        binary_path: binary,
        timeout: Some(Duration::from_secs(60)),
        ..Default::default()
    }
}

fn features_files() -> VirtualFileSet {
    VirtualFileSet::from_entries(vec![
        (
            "/index.html",
            r#"<!DOCTYPE html><body><script src="f.js"></script><script>document.body.innerText = JSON.stringify(computeFeatures({id:'123'}))</script></body>"#,
        ),
        (
            "/f.js",
            "function computeFeatures(t) { return { id: t.id, size: t.id.length * 2 }; }",
        ),
    ])
    .unwrap()
}

#[test]
#[ignore] // Requires Chromium
fn eval_returns_what_the_script_computes() {
    let text = eval_untrusted_html(features_files(), &options()).expect("eval");
    assert_eq!(text, r#"{"id":"123","size":6}"#);
}

#[test]
#[ignore] // Requires Chromium
fn eval_is_deterministic() {
    let a = eval_untrusted_html(features_files(), &options()).expect("first eval");
    let b = eval_untrusted_html(features_files(), &options()).expect("second eval");
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
#[ignore] // Requires Chromium
fn screenshot_produces_a_png() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("shot.png");
    let files = VirtualFileSet::from_entries(vec![("/index.html", "<body>Hello, world.</body>")]).unwrap();

    screenshot_untrusted_html(files, &out, &options()).expect("screenshot");

    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.len() > PNG_MAGIC.len());
    assert_eq!(&bytes[..4], PNG_MAGIC);
}

#[test]
#[ignore] // Requires Chromium
fn missing_entry_renders_the_not_found_page() {
    let files = VirtualFileSet::from_entries(vec![("/f.js", "1")]).unwrap();
    let text = eval_untrusted_html(files, &options()).expect("eval");
    assert_eq!(text.trim(), "Not Found");
}

#[test]
#[ignore] // Requires Chromium
fn token_data_reaches_the_generator() {
    let spec = GeneratorSpec::new(
        "document.body.innerText = JSON.stringify({ hash: tokenData.hash, name: tokenData.name });",
        "none",
        1.0,
    );
    let token = TokenData(json!({ "hash": "0xfeed", "name": "</script><b>x</b>" }));
    let text = render_features(&spec, &token, &LibraryBundle::new(), &options()).expect("render");
    assert_eq!(text, r#"{"hash":"0xfeed","name":"</script><b>x</b>"}"#);
}

#[test]
#[ignore] // Requires Chromium
fn token_image_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("token.png");
    let spec = GeneratorSpec::new(
        "const c = document.createElement('canvas'); c.width = 100; c.height = 150; document.body.appendChild(c);",
        "none",
        2.0 / 3.0,
    );
    assert_eq!(compute_window_size(spec.aspect_ratio, DEFAULT_LONG_EDGE).unwrap().width, 1600);

    render_image(&spec, &TokenData(json!({})), &LibraryBundle::new(), &out, &options()).expect("render");
    assert_eq!(&std::fs::read(&out).unwrap()[..4], PNG_MAGIC);
}

#[test]
#[ignore] // Requires Chromium
fn concurrent_renders_do_not_interfere() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let files = VirtualFileSet::from_entries(vec![(
                    "/index.html",
                    format!("<body><script>document.body.innerText = 'n' + {}</script></body>", i),
                )])
                .unwrap();
                (i, eval_untrusted_html(files, &options()).expect("eval"))
            })
        })
        .collect();
    for h in handles {
        let (i, text) = h.join().unwrap();
        assert_eq!(text, format!("n{}", i));
    }
}
