#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fasticon::{FetchError, FetchResponse, Fetcher, ResponseHead};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use url::Url;

/// Canned answer for one URL.
#[derive(Debug, Clone)]
pub enum Route {
    Respond {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
        final_url: Option<Url>,
    },
    Unreachable,
    Stall(Duration),
}

impl Route {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::Respond {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
            final_url: None,
        }
    }

    pub fn html(markup: &str) -> Self {
        Self::ok("text/html; charset=utf-8", markup.as_bytes())
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            content_type: Some("text/html".to_string()),
            body: b"<h1>nope</h1>".to_vec(),
            final_url: None,
        }
    }

    pub fn redirected_to(self, url: &str) -> Self {
        match self {
            Self::Respond {
                status,
                content_type,
                body,
                ..
            } => Self::Respond {
                status,
                content_type,
                body,
                final_url: Some(Url::parse(url).unwrap()),
            },
            other => other,
        }
    }
}

/// In-memory fetcher answering from a route table and logging every request
/// as `"GET <url>"` or `"HEAD <url>"`.
pub struct MockFetcher {
    routes: HashMap<String, Route>,
    fallback: Route,
    log: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            fallback: Route::status(404),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        let key = Url::parse(url).unwrap().to_string();
        self.routes.insert(key, route);
        self
    }

    pub fn fallback(mut self, route: Route) -> Self {
        self.fallback = route;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|entry| *entry == request).count()
    }

    pub fn position(&self, request: &str) -> Option<usize> {
        self.requests().iter().position(|entry| entry == request)
    }

    async fn answer(&self, method: &str, url: &Url) -> Result<(ResponseHead, Vec<u8>), FetchError> {
        self.log.lock().unwrap().push(format!("{method} {url}"));
        let route = self
            .routes
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        match route {
            Route::Respond {
                status,
                content_type,
                body,
                final_url,
            } => Ok((
                ResponseHead {
                    url: final_url.unwrap_or_else(|| url.clone()),
                    status,
                    content_type,
                    content_length: Some(body.len() as u64),
                },
                body,
            )),
            Route::Unreachable => Err(FetchError::Transport("connection refused".to_string())),
            Route::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Err(FetchError::Timeout)
            }
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let (head, body) = self.answer("GET", url).await?;
        Ok(FetchResponse::from_bytes(head, body))
    }

    async fn head(&self, url: &Url) -> Result<ResponseHead, FetchError> {
        let (head, _) = self.answer("HEAD", url).await?;
        Ok(head)
    }
}

/// PNG with a gradient so the encoded size stays well above the plausibility floor.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 5 % 256) as u8, 255])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

/// Single-color PNG; compresses to a small body whatever its dimensions.
pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

pub fn ico_bytes(sizes: &[u32]) -> Vec<u8> {
    let mut dir = ico::IconDir::new(ico::ResourceType::Icon);
    for &size in sizes {
        let rgba: Vec<u8> = (0..size * size)
            .flat_map(|i| [(i % 251) as u8, (size % 256) as u8, 40, 255])
            .collect();
        let image = ico::IconImage::from_rgba_data(size, size, rgba);
        dir.add_entry(ico::IconDirEntry::encode(&image).unwrap());
    }
    let mut buffer = Vec::new();
    dir.write(&mut buffer).unwrap();
    buffer
}

pub fn svg_markup() -> &'static str {
    r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 32 32"><circle cx="16" cy="16" r="14" fill="#3949ab"/></svg>"##
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}
