//! Streaming markup helpers built on `lol_html`.
//!
//! Both helpers register per-selector element handlers and push the document
//! through an [`HtmlRewriter`] chunk by chunk; no DOM is ever built.

use crate::candidate::{CandidateDescriptor, DeclaredSize, Role};
use lol_html::errors::RewritingError;
use lol_html::{element, HtmlRewriter, OutputSink, Settings};
use std::cell::{Cell, RefCell};
use tracing::debug;
use url::Url;

/// Icon references found while scanning a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Candidates in document order.
    pub candidates: Vec<CandidateDescriptor>,
    /// First `<link rel="manifest">` target, if any.
    pub manifest: Option<Url>,
}

struct ScanState {
    base: Url,
    result: ScanResult,
}

impl ScanState {
    fn resolve(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        match self.base.join(href) {
            Ok(url) => Some(url),
            Err(err) => {
                debug!(%href, %err, "dropping unresolvable reference");
                None
            }
        }
    }

    fn rebase(&mut self, href: &str) {
        if let Some(url) = self.resolve(href) {
            self.base = url;
        }
    }

    fn visit_link(&mut self, rel: &str, href: &str, sizes: Option<String>, ty: Option<String>) {
        if rel.trim().eq_ignore_ascii_case("manifest") {
            if self.result.manifest.is_none() {
                self.result.manifest = self.resolve(href);
            }
            return;
        }
        let Some(role) = Role::from_rel(rel) else {
            return;
        };
        let Some(url) = self.resolve(href) else {
            return;
        };
        let candidate = CandidateDescriptor::new(url, role)
            .with_size(DeclaredSize::parse(sizes.as_deref()))
            .with_type(ty);
        self.result.candidates.push(candidate);
    }

    fn visit_meta(&mut self, key: &str, content: &str) {
        if !key.trim().eq_ignore_ascii_case("og:image") {
            return;
        }
        if let Some(url) = self.resolve(content) {
            self.result
                .candidates
                .push(CandidateDescriptor::new(url, Role::SocialPreview));
        }
    }
}

/// Scans an HTML document for icon links, the manifest link and `og:image`.
///
/// `base` should be the final URL the document was served from. Malformed
/// markup never fails the scan; whatever was collected before a rewriter
/// error is returned.
pub fn scan_markup<I, C>(base: &Url, chunks: I) -> ScanResult
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let state = RefCell::new(ScanState {
        base: base.clone(),
        result: ScanResult::default(),
    });

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("base[href]", |el| {
                        if let Some(href) = el.get_attribute("href") {
                            state.borrow_mut().rebase(&href);
                        }
                        Ok(())
                    }),
                    element!("link[rel][href]", |el| {
                        if let (Some(rel), Some(href)) =
                            (el.get_attribute("rel"), el.get_attribute("href"))
                        {
                            state.borrow_mut().visit_link(
                                &rel,
                                &href,
                                el.get_attribute("sizes"),
                                el.get_attribute("type"),
                            );
                        }
                        Ok(())
                    }),
                    element!("meta[content]", |el| {
                        let key = el
                            .get_attribute("property")
                            .or_else(|| el.get_attribute("name"));
                        if let (Some(key), Some(content)) = (key, el.get_attribute("content")) {
                            state.borrow_mut().visit_meta(&key, &content);
                        }
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            NoopSink,
        );

        let mut failed = None;
        for chunk in chunks {
            if let Err(err) = rewriter.write(chunk.as_ref()) {
                failed = Some(err);
                break;
            }
        }
        let outcome = match failed {
            Some(err) => Err(err),
            None => rewriter.end(),
        };
        if let Err(err) = outcome {
            debug!(%err, "markup scan stopped early");
        }
    }

    state.into_inner().result
}

/// Errors surfaced while rewriting SVG markup.
#[derive(Debug, thiserror::Error)]
pub enum SvgRewriteError {
    /// The rewriter rejected the input.
    #[error("svg rewrite error: {0}")]
    Rewrite(#[from] RewritingError),
    /// No `<svg>` element was found.
    #[error("document has no <svg> root element")]
    MissingRoot,
}

/// Adds `width`/`height` to the root `<svg>` element when they are absent.
///
/// Every other byte of the document is passed through unchanged.
pub fn ensure_svg_dimensions(
    markup: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, SvgRewriteError> {
    let mut output = Vec::with_capacity(markup.len() + 32);
    let seen_root = Cell::new(false);
    let width = width.to_string();
    let height = height.to_string();

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("svg", |el| {
                    if seen_root.replace(true) {
                        return Ok(());
                    }
                    if !el.has_attribute("width") {
                        el.set_attribute("width", &width)?;
                    }
                    if !el.has_attribute("height") {
                        el.set_attribute("height", &height)?;
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        rewriter.write(markup)?;
        rewriter.end()?;
    }

    if !seen_root.get() {
        return Err(SvgRewriteError::MissingRoot);
    }
    Ok(output)
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}
