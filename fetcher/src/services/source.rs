use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

pub type FetchResult = Result<Bytes, String>;
pub type FetchFuture = Pin<Box<dyn Future<Output = FetchResult> + Send + 'static>>;
/// Turns a resolved tile URL into its body. Injected so the loader can run
/// against an in-process source in tests.
pub type FetchFn = Arc<dyn Fn(String) -> FetchFuture + Send + Sync>;

pub fn http_fetch(client: reqwest::Client) -> FetchFn {
    Arc::new(move |url: String| -> FetchFuture {
        let client = client.clone();
        Box::pin(async move {
            fetch_tile(&client, &url)
                .await
                .map_err(|e| e.to_string())
        })
    })
}

async fn fetch_tile(
    client: &reqwest::Client,
    url: &str,
) -> Result<Bytes, Box<dyn std::error::Error + Send + Sync>> {
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?)
}
