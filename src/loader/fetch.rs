//! Where model bytes come from.
//!
//! Native builds read from an `assets/` directory through the tokio runtime,
//! the web build fetches from `<origin>/assets/`.

use futures::future::LocalBoxFuture;

use crate::error::LoadError;

/// Fetches raw bytes by a URI relative to some root.
pub trait Fetch {
    fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>>;
}

/// Resolve `uri` against the directory of `base`, the way a model file
/// references its side-car buffers.
pub fn resolve_relative(base: &str, uri: &str) -> String {
    match base.rfind('/') {
        Some(idx) => format!("{}{}", &base[..=idx], uri),
        None => uri.to_string(),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::FileFetch;
#[cfg(target_arch = "wasm32")]
pub use web::HttpFetch;

/// The fetcher the app uses on this platform.
#[cfg(not(target_arch = "wasm32"))]
pub type AssetFetch = FileFetch;
/// The fetcher the app uses on this platform.
#[cfg(target_arch = "wasm32")]
pub type AssetFetch = HttpFetch;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::PathBuf;

    use futures::{FutureExt, future::LocalBoxFuture};

    use super::Fetch;
    use crate::error::LoadError;

    /// Reads files below `root` on the tokio blocking pool.
    #[derive(Clone, Debug)]
    pub struct FileFetch {
        root: PathBuf,
        runtime: tokio::runtime::Handle,
    }

    impl FileFetch {
        /// Serve files below `root`.
        pub fn new(root: impl Into<PathBuf>, runtime: tokio::runtime::Handle) -> Self {
            Self {
                root: root.into(),
                runtime,
            }
        }

        /// `./assets` below the working directory.
        pub fn assets(runtime: tokio::runtime::Handle) -> Self {
            Self::new(std::path::Path::new("./").join("assets"), runtime)
        }
    }

    impl Fetch for FileFetch {
        fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>> {
            let path = self.root.join(uri);
            let uri = uri.to_string();
            let read = self.runtime.spawn(tokio::fs::read(path));
            async move {
                match read.await {
                    Ok(Ok(bytes)) => Ok(bytes),
                    Ok(Err(e)) => Err(LoadError::Fetch {
                        uri,
                        reason: e.to_string(),
                    }),
                    Err(e) => Err(LoadError::Fetch {
                        uri,
                        reason: e.to_string(),
                    }),
                }
            }
            .boxed_local()
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use futures::{FutureExt, future::LocalBoxFuture};

    use super::Fetch;
    use crate::error::LoadError;

    /// Fetches over HTTP relative to `base`.
    #[derive(Clone, Debug)]
    pub struct HttpFetch {
        base: reqwest::Url,
    }

    impl HttpFetch {
        /// Fetch relative to `base`.
        pub fn new(base: reqwest::Url) -> Self {
            Self { base }
        }

        /// `<page origin>/assets/`.
        pub fn assets() -> Result<Self, LoadError> {
            let unavailable = |reason: &str| LoadError::Fetch {
                uri: "assets/".to_string(),
                reason: reason.to_string(),
            };
            let window = web_sys::window().ok_or_else(|| unavailable("no window"))?;
            let origin = window
                .location()
                .origin()
                .map_err(|_| unavailable("page origin unavailable"))?;
            let base = reqwest::Url::parse(&format!("{}/assets/", origin))
                .map_err(|e| unavailable(&e.to_string()))?;
            Ok(Self::new(base))
        }
    }

    impl Fetch for HttpFetch {
        fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>> {
            let url = self.base.join(uri);
            let uri = uri.to_string();
            async move {
                let failed = |reason: String| LoadError::Fetch {
                    uri: uri.clone(),
                    reason,
                };
                let url = url.map_err(|e| failed(e.to_string()))?;
                let response = reqwest::get(url)
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| failed(e.to_string()))?;
                let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            .boxed_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_car_buffers_resolve_next_to_the_model() {
        assert_eq!(resolve_relative("models/cube.gltf", "cube.bin"), "models/cube.bin");
        assert_eq!(resolve_relative("cube.gltf", "cube.bin"), "cube.bin");
    }
}
