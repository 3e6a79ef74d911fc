pub mod dpop;

use http::{Request, Response};
use std::future::Future;
use std::sync::Arc;

/// An abstract HTTP client.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClient {
    /// Send an HTTP request and return the response.
    fn send_http(
        &self,
        request: Request<Vec<u8>>,
    ) -> impl Future<
        Output = core::result::Result<
            Response<Vec<u8>>,
            Box<dyn std::error::Error + Send + Sync + 'static>,
        >,
    >;
}

impl<T> HttpClient for Arc<T>
where
    T: HttpClient + Send + Sync,
{
    async fn send_http(
        &self,
        request: Request<Vec<u8>>,
    ) -> core::result::Result<Response<Vec<u8>>, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        self.as_ref().send_http(request).await
    }
}

#[cfg(feature = "default-client")]
pub use self::default::DefaultHttpClient;

#[cfg(feature = "default-client")]
mod default {
    use super::HttpClient;
    use http::{Request, Response};
    use reqwest::Client;

    /// [`HttpClient`] backed by [`reqwest`].
    #[derive(Clone, Debug, Default)]
    pub struct DefaultHttpClient {
        client: Client,
    }

    impl DefaultHttpClient {
        pub fn new(client: Client) -> Self {
            Self { client }
        }
    }

    impl HttpClient for DefaultHttpClient {
        async fn send_http(
            &self,
            request: Request<Vec<u8>>,
        ) -> core::result::Result<
            Response<Vec<u8>>,
            Box<dyn std::error::Error + Send + Sync + 'static>,
        > {
            let response = self.client.execute(request.try_into()?).await?;
            let mut builder = Response::builder().status(response.status());
            for (k, v) in response.headers() {
                builder = builder.header(k, v);
            }
            builder.body(response.bytes().await?.to_vec()).map_err(Into::into)
        }
    }
}
