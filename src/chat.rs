//! Question answering over an extracted record.
//!
//! The question, the 13 fields and the additional information go to the
//! model's `/api/generate` endpoint as one prompt. The answer streams back
//! and [`ExtractionProgressCallback::on_chat_update`] sees the whole answer
//! so far after every fragment, which is what a chat UI redraws. Chat is
//! not retried.

use crate::config::ExtractionConfig;
use crate::error::InvoiceError;
use crate::progress::ExtractionProgressCallback;
use crate::prompts::chat_prompt;
use crate::record::ExtractedRecord;
use crate::stream::{collect_text, FragmentPath};
use crate::transport::{GenerateRequest, ModelRequest, ModelTransport};
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Ask `question` about `record` and return the model's full answer.
pub async fn ask(
    transport: &dyn ModelTransport,
    config: &ExtractionConfig,
    record: &ExtractedRecord,
    question: &str,
    progress: &dyn ExtractionProgressCallback,
) -> Result<String, InvoiceError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(InvoiceError::EmptyQuestion);
    }

    let request = ModelRequest::Generate(GenerateRequest::chat(
        config,
        chat_prompt(record, question),
    ));
    debug!("Chat question: {:?}", question);

    let fetch = async {
        let stream = transport.send(&request).await?;
        let mut so_far = String::new();
        collect_text(stream, FragmentPath::Response, |fragment| {
            so_far.push_str(fragment);
            progress.on_chat_update(&so_far);
        })
        .await
    };

    let answer = match config.request_timeout_secs {
        Some(secs) => timeout(Duration::from_secs(secs), fetch)
            .await
            .map_err(|_| InvoiceError::ChatFailed {
                detail: format!("no answer within {secs}s"),
            })??,
        None => fetch.await?,
    };

    if answer.trim().is_empty() {
        return Err(InvoiceError::ChatFailed {
            detail: "the model returned an empty answer".into(),
        });
    }
    debug!("Chat answer: {} chars", answer.len());
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::progress::{ChannelProgress, NoopProgressCallback, ProgressEvent};
    use crate::schema::FieldKey;
    use crate::transport::ByteStream;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;

    struct Recorder {
        reply: Result<Vec<&'static str>, TransportError>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    #[async_trait]
    impl ModelTransport for Recorder {
        async fn send(&self, request: &ModelRequest) -> Result<ByteStream, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let chunks = self.reply.clone()?;
            Ok(futures::stream::iter(
                chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec())),
            )
            .boxed())
        }
    }

    fn record() -> ExtractedRecord {
        let mut r = ExtractedRecord::new();
        r.set(FieldKey::VendorName, Some("Globex".into()));
        r
    }

    #[tokio::test]
    async fn streams_accumulated_answer() {
        let transport = Recorder {
            reply: Ok(vec![
                "{\"response\":\"The vendor \"}\n",
                "{\"response\":\"is Globex.\"}\n{\"done\":true}\n",
            ]),
            seen: Mutex::new(Vec::new()),
        };
        let (progress, mut rx) = ChannelProgress::channel();
        let config = ExtractionConfig::default();

        let answer = ask(&transport, &config, &record(), " Who is the vendor? ", &progress)
            .await
            .unwrap();
        assert_eq!(answer, "The vendor is Globex.");

        drop(progress);
        let mut updates = Vec::new();
        while let Some(ProgressEvent::ChatUpdate { accumulated }) = rx.recv().await {
            updates.push(accumulated);
        }
        assert_eq!(updates, vec!["The vendor ", "The vendor is Globex."]);

        let seen = transport.seen.lock().unwrap();
        match &seen[0] {
            ModelRequest::Generate(req) => {
                assert!(req.prompt.contains("Vendor Name: Globex"));
                assert!(req.prompt.contains("User question: Who is the vendor?"));
                assert!(req.stream);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let transport = Recorder {
            reply: Ok(vec![]),
            seen: Mutex::new(Vec::new()),
        };
        let err = ask(
            &transport,
            &ExtractionConfig::default(),
            &record(),
            "   ",
            &NoopProgressCallback,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InvoiceError::EmptyQuestion));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_answer_fails() {
        let transport = Recorder {
            reply: Ok(vec!["{\"done\":true}\n"]),
            seen: Mutex::new(Vec::new()),
        };
        let err = ask(
            &transport,
            &ExtractionConfig::default(),
            &record(),
            "Total?",
            &NoopProgressCallback,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InvoiceError::ChatFailed { .. }));
    }

    #[tokio::test]
    async fn transport_error_surfaces() {
        let transport = Recorder {
            reply: Err(TransportError::Status {
                status: 404,
                body: "model not found".into(),
            }),
            seen: Mutex::new(Vec::new()),
        };
        let err = ask(
            &transport,
            &ExtractionConfig::default(),
            &record(),
            "Total?",
            &NoopProgressCallback,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            InvoiceError::Transport(TransportError::Status { status: 404, .. })
        ));
    }
}
