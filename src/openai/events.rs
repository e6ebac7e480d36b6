//! Run event decoding.
//!
//! The SDK hands us `AssistantStreamEvent`, a wide enum mirroring every server-sent event
//! name. The run driver only needs three cases, so the stream is narrowed to [`RunEvent`]
//! once, right where it leaves the client.

use async_openai::error::OpenAIError;
use async_openai::types::{AssistantStreamEvent, MessageDeltaContent, MessageDeltaObject};
use color_eyre::eyre::{eyre, Result};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// The subset of run-lifecycle events the driver acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A new execution step has begun.
    StepCreated { step_id: String },
    /// A fragment of the assistant's reply.
    MessageDelta { text: String },
    /// Anything else. `kind` is the server-side event name, kept for logging.
    Other { kind: &'static str },
}

impl TryFrom<AssistantStreamEvent> for RunEvent {
    type Error = color_eyre::Report;

    fn try_from(event: AssistantStreamEvent) -> Result<Self> {
        use AssistantStreamEvent as E;
        let kind = match event {
            E::ThreadRunStepCreated(step) => return Ok(RunEvent::StepCreated { step_id: step.id }),
            E::ThreadMessageDelta(delta) => match delta_text(&delta)? {
                Some(text) => return Ok(RunEvent::MessageDelta { text }),
                // 画像などテキスト以外だけの差分
                None => "thread.message.delta",
            },
            E::ErrorEvent(err) => return Err(eyre!("run stream reported an error: {}", err.message)),
            E::ThreadCreated(_) => "thread.created",
            E::ThreadRunCreated(_) => "thread.run.created",
            E::ThreadRunQueued(_) => "thread.run.queued",
            E::ThreadRunInProgress(_) => "thread.run.in_progress",
            E::ThreadRunRequiresAction(_) => "thread.run.requires_action",
            E::ThreadRunCompleted(_) => "thread.run.completed",
            E::ThreadRunIncomplete(_) => "thread.run.incomplete",
            E::ThreadRunFailed(_) => "thread.run.failed",
            E::ThreadRunCancelling(_) => "thread.run.cancelling",
            E::ThreadRunCancelled(_) => "thread.run.cancelled",
            E::ThreadRunExpired(_) => "thread.run.expired",
            E::ThreadRunStepInProgress(_) => "thread.run.step.in_progress",
            E::ThreadRunStepDelta(_) => "thread.run.step.delta",
            E::ThreadRunStepCompleted(_) => "thread.run.step.completed",
            E::ThreadRunStepFailed(_) => "thread.run.step.failed",
            E::ThreadRunStepCancelled(_) => "thread.run.step.cancelled",
            E::ThreadRunStepExpired(_) => "thread.run.step.expired",
            E::ThreadMessageCreated(_) => "thread.message.created",
            E::ThreadMessageInProgress(_) => "thread.message.in_progress",
            E::ThreadMessageCompleted(_) => "thread.message.completed",
            E::ThreadMessageIncomplete(_) => "thread.message.incomplete",
            E::Done(_) => "done",
            #[allow(unreachable_patterns)]
            _ => "unknown",
        };
        Ok(RunEvent::Other { kind })
    }
}

/// Decoded run events as handed out by the client wrapper.
pub type RunEventStream = BoxStream<'static, Result<RunEvent>>;

/// Concatenates the text fragments of one message delta, in fragment order.
///
/// Non-text fragments (image files, image URLs, refusals) are skipped; a delta made only of
/// them yields `None`. A text fragment without a value is an error.
pub fn delta_text(delta: &MessageDeltaObject) -> Result<Option<String>> {
    let Some(content) = delta.delta.content.as_deref() else {
        return Ok(None);
    };

    let mut fragments = Vec::new();
    for part in content {
        if let MessageDeltaContent::Text(t) = part {
            let value = t
                .text
                .as_ref()
                .and_then(|text| text.value.as_deref())
                .ok_or_else(|| eyre!("malformed message delta {}: text fragment without value", delta.id))?;
            fragments.push((t.index, value));
        }
    }
    if fragments.is_empty() {
        return Ok(None);
    }
    fragments.sort_by_key(|(index, _)| *index);
    Ok(Some(fragments.into_iter().map(|(_, v)| v).collect()))
}

/// Narrows a raw SDK event stream to `RunEvent`s. Transport errors and malformed events
/// both surface as `Err` items.
pub fn decode_stream<S>(raw: S) -> impl Stream<Item = Result<RunEvent>>
where
    S: Stream<Item = std::result::Result<AssistantStreamEvent, OpenAIError>>,
{
    raw.map(|item| item.map_err(color_eyre::Report::from).and_then(RunEvent::try_from))
}
