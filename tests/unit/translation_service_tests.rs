/*!
 * Tests for the provider-backed translation service against a local Ollama stand-in
 */

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use pagewise::app_config::{TranslationConfig, TranslationProvider};
use pagewise::document::{ContentBlock, NormalizedDocument};
use pagewise::errors::TranslationError;
use pagewise::translation::{
    CancellationFlag, Translate, TranslationMode, TranslationService, plan_chunks, response_fits_payload, translate,
};

use crate::common;

/// Minimal Ollama `/api/generate` server answering every request with `reply(prompt_body)`
struct OllamaStub {
    endpoint: String,
    requests: Arc<AtomicUsize>,
}

impl OllamaStub {
    async fn start(reply: fn(&str) -> String) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}", listener.local_addr()?);
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let _ = Self::answer(stream, reply).await;
                });
            }
        });

        Ok(Self { endpoint, requests })
    }

    async fn answer(mut stream: TcpStream, reply: fn(&str) -> String) -> std::io::Result<()> {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let body_start = loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..body_start]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while raw.len() < body_start + content_length {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }

        let body = String::from_utf8_lossy(&raw[body_start..]).to_string();
        let payload = serde_json::json!({
            "model": "stub",
            "response": reply(&body),
            "done": true
        })
        .to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            payload.len(),
            payload
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn service(&self) -> Result<TranslationService> {
        let mut config = TranslationConfig::default();
        config.provider = TranslationProvider::Ollama;
        let provider = config.active_provider_config_mut();
        provider.endpoint = self.endpoint.clone();
        provider.model = "stub".to_string();
        TranslationService::new(config)
    }
}

fn two_paragraph_document() -> NormalizedDocument {
    NormalizedDocument::from_blocks(
        "Notes",
        "https://example.com/notes",
        vec![
            ContentBlock::paragraph("The first paragraph."),
            ContentBlock::paragraph("The second paragraph."),
        ],
    )
}

fn garbled_for_segments(body: &str) -> String {
    if body.contains("<<SEG_") {
        "garbled answer without markers".to_string()
    } else {
        "标题".to_string()
    }
}

#[tokio::test]
async fn test_translate_withGarbledSegmentedAnswers_shouldRetryAgainstProvider() -> Result<()> {
    let stub = OllamaStub::start(garbled_for_segments).await?;
    let service = stub.service()?;
    let mut plan = plan_chunks(&two_paragraph_document(), 4000);
    assert_eq!(plan.units.len(), 1);

    let err = translate(
        &mut plan,
        TranslationMode::Translated,
        &service,
        &common::fast_engine("zh"),
        &CancellationFlag::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TranslationError::AllChunksFailed { chunks: 1 }));
    // Title once, then the chunk on its first attempt and each of the 3 retries
    assert_eq!(stub.request_count(), 5);
    assert_eq!(service.cache.stats().hits, 0);
    Ok(())
}

#[tokio::test]
async fn test_translate_withAcceptedAnswer_shouldServeRepeatFromCache() -> Result<()> {
    let stub = OllamaStub::start(|_| "你好".to_string()).await?;
    let service = stub.service()?;

    assert_eq!(service.translate("Hello", "zh").await?, "你好");
    assert_eq!(service.translate("Hello", "zh").await?, "你好");

    assert_eq!(stub.request_count(), 1);
    assert_eq!(service.cache.stats().hits, 1);
    Ok(())
}

#[test]
fn test_responseFitsPayload_shouldRequireEverySegment() {
    let payload = "<<SEG_1>>\nOne\n<<SEG_2>>\nTwo\n<<END>>";
    assert!(response_fits_payload(payload, "<<SEG_1>>\n一\n<<SEG_2>>\n二\n<<END>>"));
    assert!(!response_fits_payload(payload, "garbled answer without markers"));
    assert!(response_fits_payload("Hello", "你好"));
    assert!(!response_fits_payload("Hello", "  "));
}
