use std::path::Path;

use ahash::AHashMap;
use itertools::Itertools;
use lol_html::{element, HtmlRewriter, Settings};

use super::Publisher;
use crate::prelude::*;

/// What an uploaded image is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upload {
    /// Referenced from article content by URL.
    Content,
    /// A cover thumbnail, referenced by media ID.
    Thumb,
}

fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Collects the distinct `src` values of `<img>` tags that do not point at the web, in
/// document order.
pub fn local_images(hypertext: &str) -> Result<Vec<String>> {
    let mut sources = vec![];
    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("img[src]", |el| {
                    if let Some(src) = el.get_attribute("src") {
                        if !is_remote(&src) {
                            sources.push(src);
                        }
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |_: &[u8]| (),
        );
        rewriter.write(hypertext.as_bytes())?;
        rewriter.end()?;
    }

    Ok(sources.into_iter().unique().collect())
}

/// Uploads each image, resolved against `base_dir`, mapping its path to the uploaded URL
/// (or media ID, for thumbnails).
///
/// Missing files and failed uploads map to themselves, leaving the `src` as written.
pub fn upload_images(
    publisher: &dyn Publisher,
    images: &[String],
    base_dir: &Path,
    kind: Upload,
) -> AHashMap<String, String> {
    images
        .iter()
        .map(|image| {
            let path = base_dir.join(image);

            if !path.is_file() {
                warn!("Image file not found: {image}");
                return (image.clone(), image.clone());
            }

            let uploaded = match kind {
                Upload::Content => publisher.upload_image(&path),
                Upload::Thumb => publisher.upload_thumb(&path),
            };

            match uploaded {
                Ok(url) => {
                    debug!("Uploaded {image} to {url}.");
                    (image.clone(), url)
                }
                Err(err) => {
                    error!("Failed to upload image {image}: {err}");
                    (image.clone(), image.clone())
                }
            }
        })
        .collect()
}

/// Rewrites `<img src>` values found in `map`.
pub fn replace_sources(hypertext: &str, map: &AHashMap<String, String>) -> Result<String> {
    let mut output = vec![];
    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("img[src]", |el| {
                    let replacement = el.get_attribute("src").and_then(|src| map.get(&src));

                    if let Some(url) = replacement {
                        el.set_attribute("src", url)?;
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(hypertext.as_bytes())?;
        rewriter.end()?;
    }
    let hypertext = String::from_utf8(output)?;
    Ok(hypertext)
}

/// Uploads every local image in `hypertext` and points its tags at the uploaded copies.
pub fn process_images(hypertext: &str, publisher: &dyn Publisher, base_dir: &Path) -> Result<String> {
    let images = local_images(hypertext)?;

    if images.is_empty() {
        return Ok(hypertext.to_owned());
    }

    info!("Found {} local image(s), uploading...", images.len());
    let map = upload_images(publisher, &images, base_dir, Upload::Content);
    replace_sources(hypertext, &map)
}
