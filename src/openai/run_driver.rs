//! ストリーミング run の駆動
//!
//! 1つの run のイベント列を順に消費し、アシスタントのテキスト差分を連結しつつ、
//! 節目ごとに進捗通知を呼び出し側のシンクへ送る。
//!
//! 進捗値 0/25/50/100 は完了率ではなく「節目の種類」を表す固定値。
//! step や delta が複数回来れば同じ値が繰り返し送られる。

use std::fmt::{self, Display};
use std::future::Future;

use color_eyre::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::events::RunEvent;

pub const PROGRESS_STARTED: u32 = 0;
pub const PROGRESS_STEP: u32 = 25;
pub const PROGRESS_DELTA: u32 = 50;
pub const PROGRESS_COMPLETE: u32 = 100;

pub const MESSAGE_STARTED: &str = "run starting";
pub const MESSAGE_STEP: &str = "step in progress";
pub const MESSAGE_COMPLETE: &str = "run complete";

/// 進捗通知1件。送信後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: u32,
    pub total: Option<u32>,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(progress: u32, message: impl Into<String>) -> Self {
        Self { progress, total: None, message: message.into() }
    }
}

impl Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "[{}/{}] {}", self.progress, total, self.message),
            None => write!(f, "[{}] {}", self.progress, self.message),
        }
    }
}

/// 進捗通知の受け口。呼び出しは await され、発行順に届けられること。
pub trait ProgressSink {
    fn report(&mut self, update: ProgressUpdate) -> impl Future<Output = Result<()>>;
}

/// 受け取った通知をそのまま溜める (テストや後段での検査用)
impl ProgressSink for Vec<ProgressUpdate> {
    async fn report(&mut self, update: ProgressUpdate) -> Result<()> {
        self.push(update);
        Ok(())
    }
}

/// チャネル経由で別タスクへ流す。受信側が閉じていればエラー。
impl ProgressSink for mpsc::Sender<ProgressUpdate> {
    async fn report(&mut self, update: ProgressUpdate) -> Result<()> {
        self.send(update).await?;
        Ok(())
    }
}

/// 通知を捨てる (ログには残す)
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardProgress;

impl ProgressSink for DiscardProgress {
    async fn report(&mut self, update: ProgressUpdate) -> Result<()> {
        debug!(target: "openai", %update, "progress_discarded");
        Ok(())
    }
}

/// run のイベント列を最後まで消費し、連結したアシスタントの応答テキストを返す。
///
/// - 開始時に `(0, "run starting")`
/// - `StepCreated` ごとに `(25, "step in progress")`
/// - `MessageDelta` ごとにテキストを追記し `(50, <ここまでの全文>)`
/// - 正常終了時に `(100, "run complete")` を送ってから全文を返す
///
/// ストリームがエラーを返した場合は完了通知を送らず、途中までのテキストも捨ててエラーを返す。
pub async fn drive_run<E, S>(events: E, sink: &mut S) -> Result<String>
where
    E: Stream<Item = Result<RunEvent>>,
    S: ProgressSink + ?Sized,
{
    report_started(sink).await?;
    follow_run(events, sink).await
}

/// 開始通知 `(0, "run starting")` だけを送る。
/// ストリームを開く前の準備 (メッセージ投稿など) より先に通知したいときに使い、続きは [`follow_run`] で。
pub async fn report_started<S>(sink: &mut S) -> Result<()>
where
    S: ProgressSink + ?Sized,
{
    sink.report(ProgressUpdate::new(PROGRESS_STARTED, MESSAGE_STARTED)).await
}

/// 開始通知を送った後の残り: イベントを消費して 25/50 を送り、最後に 100。
#[instrument(name = "drive_run", skip_all)]
pub async fn follow_run<E, S>(events: E, sink: &mut S) -> Result<String>
where
    E: Stream<Item = Result<RunEvent>>,
    S: ProgressSink + ?Sized,
{
    let mut events = std::pin::pin!(events);
    let mut response = String::new();
    let mut steps = 0usize;
    let mut deltas = 0usize;
    while let Some(event) = events.next().await {
        match event? {
            RunEvent::StepCreated { step_id } => {
                steps += 1;
                debug!(target: "openai", %step_id, "run_step_created");
                sink.report(ProgressUpdate::new(PROGRESS_STEP, MESSAGE_STEP)).await?;
            }
            RunEvent::MessageDelta { text } => {
                deltas += 1;
                response.push_str(&text);
                sink.report(ProgressUpdate::new(PROGRESS_DELTA, response.as_str())).await?;
            }
            RunEvent::Other { kind } => {
                debug!(target: "openai", kind, "run_event_ignored");
            }
        }
    }

    sink.report(ProgressUpdate::new(PROGRESS_COMPLETE, MESSAGE_COMPLETE)).await?;
    info!(target: "openai", steps, deltas, response_len = response.len(), "run_complete");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;
    use futures::stream;

    fn delta(text: &str) -> Result<RunEvent> {
        Ok(RunEvent::MessageDelta { text: text.to_string() })
    }

    #[tokio::test]
    async fn other_events_leave_no_trace() -> Result<()> {
        let events = stream::iter(vec![
            Ok(RunEvent::Other { kind: "thread.run.created" }),
            delta("ok"),
            Ok(RunEvent::Other { kind: "thread.message.completed" }),
        ]);
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let text = drive_run(events, &mut sink).await?;
        assert_eq!(text, "ok");
        let progress: Vec<u32> = sink.iter().map(|u| u.progress).collect();
        assert_eq!(progress, vec![0, 50, 100]);
        Ok(())
    }

    #[tokio::test]
    async fn closed_channel_sink_fails_the_run() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let mut sink = tx;
        let res = drive_run(stream::iter(vec![delta("x")]), &mut sink).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn error_stops_consumption() {
        let events = stream::iter(vec![delta("a"), Err(eyre!("boom")), delta("b")]);
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        let err = drive_run(events, &mut sink).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(sink.last().map(|u| u.message.as_str()), Some("a"));
    }

    #[tokio::test]
    async fn started_then_follow_matches_drive_run() -> Result<()> {
        let events = || stream::iter(vec![Ok(RunEvent::StepCreated { step_id: "s".into() }), delta("hi")]);
        let mut whole: Vec<ProgressUpdate> = Vec::new();
        let mut split: Vec<ProgressUpdate> = Vec::new();
        let a = drive_run(events(), &mut whole).await?;
        report_started(&mut split).await?;
        let b = follow_run(events(), &mut split).await?;
        assert_eq!(a, b);
        assert_eq!(whole, split);
        Ok(())
    }

    #[test]
    fn progress_update_display() {
        assert_eq!(ProgressUpdate::new(25, MESSAGE_STEP).to_string(), "[25] step in progress");
        let with_total = ProgressUpdate { total: Some(100), ..ProgressUpdate::new(50, "x") };
        assert_eq!(with_total.to_string(), "[50/100] x");
    }
}
