use super::*;
use crate::api::{ActionResponse, CookieJar, JobStatus, StatusReport, UploadResponse};
use crate::ui::{ButtonState, UiEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Upload(String),
    Start(String),
    Progress(String),
    Process(FileId),
    Delete(FileId),
}

/// In-memory server answering from a script, recording every call
#[derive(Default)]
struct ScriptedApi {
    upload: Mutex<Option<Result<UploadResponse, ApiError>>>,
    start: Mutex<Option<Result<(), ApiError>>>,
    progress: Mutex<VecDeque<Result<StatusReport, ApiError>>>,
    action: Mutex<Option<Result<ActionResponse, ApiError>>>,
    delete: Mutex<Option<Result<(), ApiError>>>,
    calls: Mutex<Vec<(Call, Instant)>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl ScriptedApi {
    fn accepting(progress_id: &str) -> Self {
        let api = Self::default();
        *api.upload.lock().unwrap() = Some(Ok(UploadResponse {
            success: true,
            progress_id: Some(ProgressId::new(progress_id)),
            ..Default::default()
        }));
        *api.start.lock().unwrap() = Some(Ok(()));
        api
    }

    fn with_statuses(self, statuses: Vec<Result<StatusReport, ApiError>>) -> Self {
        *self.progress.lock().unwrap() = statuses.into();
        self
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    fn progress_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Progress(_)))
            .count()
    }
}

#[async_trait]
impl ProcessorApi for ScriptedApi {
    async fn upload(
        &self,
        submission: &Submission,
        _options: &UploadOptions,
        csrf: Option<&str>,
    ) -> Result<UploadResponse, ApiError> {
        self.log(Call::Upload(submission.file_name.clone()));
        self.tokens.lock().unwrap().push(csrf.map(str::to_string));
        self.upload
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ApiError::Network("no upload scripted".into())))
    }

    async fn start_processing(&self, id: &ProgressId, csrf: Option<&str>) -> Result<(), ApiError> {
        self.log(Call::Start(id.to_string()));
        self.tokens.lock().unwrap().push(csrf.map(str::to_string));
        self.start
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ApiError::Network("no start scripted".into())))
    }

    async fn progress(&self, id: &ProgressId) -> Result<StatusReport, ApiError> {
        self.log(Call::Progress(id.to_string()));
        self.progress
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatusReport::new(JobStatus::Pending)))
    }

    async fn process_file(
        &self,
        file_id: FileId,
        _csrf: Option<&str>,
    ) -> Result<ActionResponse, ApiError> {
        self.log(Call::Process(file_id));
        self.action
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ApiError::Network("no action scripted".into())))
    }

    async fn delete_file(&self, file_id: FileId, _csrf: Option<&str>) -> Result<(), ApiError> {
        self.log(Call::Delete(file_id));
        self.delete
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ApiError::Network("no delete scripted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    api: Arc<ScriptedApi>,
    controller: UploadController,
    events: mpsc::UnboundedReceiver<UiEvent>,
}

impl Harness {
    fn new(api: ScriptedApi) -> Self {
        Self::with_policy(api, PollPolicy::default())
    }

    fn with_policy(api: ScriptedApi, policy: PollPolicy) -> Self {
        let api = Arc::new(api);
        let (ui, events) = UiHandle::new();
        let jar = CookieJar::parse("sessionid=s; csrftoken=tok", "csrftoken");
        let controller = UploadController::new(api.clone(), Arc::new(jar), ui, policy);
        Self {
            api,
            controller,
            events,
        }
    }

    fn drain(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn report_xlsx() -> Option<SelectedFile> {
    Some(SelectedFile::new("/tmp/report.xlsx", "report.xlsx", 2_000_000))
}

fn alerts(events: &[UiEvent]) -> Vec<(AlertKind, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::AlertShown(alert) => Some((alert.kind, alert.message.clone())),
            _ => None,
        })
        .collect()
}

fn button_changes(events: &[UiEvent]) -> Vec<ButtonState> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Button(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn pending() -> Result<StatusReport, ApiError> {
    Ok(StatusReport::new(JobStatus::Pending))
}

#[tokio::test(start_paused = true)]
async fn test_full_flow_completes_and_reloads_once() {
    let api = ScriptedApi::accepting("p1").with_statuses(vec![
        pending(),
        pending(),
        Ok(StatusReport::new(JobStatus::Completed).with_message("Processing complete.")),
    ]);
    let mut h = Harness::new(api);
    let cancel = CancellationToken::new();

    let outcome = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &cancel)
        .await
        .unwrap();
    assert!(outcome.is_success());

    assert_eq!(
        h.api.calls(),
        vec![
            Call::Upload("report.xlsx".into()),
            Call::Start("p1".into()),
            Call::Progress("p1".into()),
            Call::Progress("p1".into()),
            Call::Progress("p1".into()),
        ]
    );

    // Three status checks, two seconds apart.
    let times = h.api.call_times();
    assert!(times[3] - times[2] >= Duration::from_secs(2));
    assert!(times[4] - times[3] >= Duration::from_secs(2));

    // Button held for the whole sequence, released only at the end.
    let events = h.drain();
    assert_eq!(
        button_changes(&events),
        vec![ButtonState::Processing, ButtonState::Ready]
    );
    assert_eq!(
        alerts(&events),
        vec![(AlertKind::Success, "Processing complete!".to_string())]
    );
    assert!(!events.contains(&UiEvent::Reload), "reload must wait 1.5s");

    let last_poll = times[4];
    h.controller.ui().settle().await;
    assert_eq!(last_poll.elapsed(), RELOAD_AFTER_COMPLETE);

    let reloads = h
        .drain()
        .into_iter()
        .filter(|e| *e == UiEvent::Reload)
        .count();
    assert_eq!(reloads, 1);

    // Nothing polls after the terminal answer.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.api.progress_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_progress_events_for_pending_checks() {
    let mut h = Harness::new(ScriptedApi::accepting("p1").with_statuses(vec![
        Ok(StatusReport {
            status: JobStatus::Processing,
            message: Some("Processing in progress...".into()),
            progress: Some(50),
        }),
        Ok(StatusReport::new(JobStatus::Completed)),
    ]));

    h.controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let progress: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            UiEvent::Progress(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].status, JobStatus::Processing);
    assert_eq!(progress[0].percent, Some(50));
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_shows_danger_and_stops() {
    let mut h = Harness::new(
        ScriptedApi::accepting("p9")
            .with_statuses(vec![Ok(StatusReport::new(JobStatus::Failed).with_message("bad data"))]),
    );

    let outcome = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            progress_id: ProgressId::new("p9"),
            message: "bad data".into()
        }
    );

    let events = h.drain();
    let shown = alerts(&events);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, AlertKind::Danger);
    assert!(shown[0].1.contains("bad data"));
    assert_eq!(h.controller.ui().button_state(), ButtonState::Ready);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.api.progress_calls(), 1);
    h.controller.ui().settle().await;
    assert!(!h.drain().contains(&UiEvent::Reload));
}

#[tokio::test]
async fn test_validation_failure_makes_no_request() {
    let mut h = Harness::new(ScriptedApi::accepting("p1"));

    let err = h
        .controller
        .submit(
            Some(SelectedFile::new("/tmp/report.csv", "report.csv", 2_000_000)),
            &UploadOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControllerError::Validation(ValidationError::BadExtension { .. })
    ));
    assert!(h.api.calls().is_empty());

    let events = h.drain();
    assert!(button_changes(&events).is_empty(), "button stays enabled");
    assert_eq!(
        alerts(&events),
        vec![(
            AlertKind::Warning,
            "Only Excel files (.xlsx, .xls) are allowed.".to_string()
        )]
    );
}

#[tokio::test]
async fn test_oversized_and_missing_files_make_no_request() {
    let h = Harness::new(ScriptedApi::accepting("p1"));
    let cancel = CancellationToken::new();

    let big = Some(SelectedFile::new("/tmp/big.xlsx", "big.xlsx", 11 * 1024 * 1024));
    let err = h
        .controller
        .submit(big, &UploadOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Validation(ValidationError::TooLarge { .. })
    ));

    let err = h
        .controller
        .submit(None, &UploadOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Validation(ValidationError::MissingFile)
    ));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn test_upload_without_progress_id_fails() {
    let api = ScriptedApi::default();
    *api.upload.lock().unwrap() = Some(Ok(UploadResponse {
        success: true,
        ..Default::default()
    }));
    let mut h = Harness::new(api);

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::UploadFailed(_)));
    assert_eq!(h.api.calls(), vec![Call::Upload("report.xlsx".into())]);

    let events = h.drain();
    assert_eq!(
        button_changes(&events),
        vec![ButtonState::Processing, ButtonState::Ready]
    );
    assert_eq!(
        alerts(&events),
        vec![(AlertKind::Danger, "Upload failed.".to_string())]
    );
}

#[tokio::test]
async fn test_upload_transport_error_releases_button() {
    let api = ScriptedApi::default();
    *api.upload.lock().unwrap() = Some(Err(ApiError::Status {
        status: 500,
        body: "<h1>Server Error (500)</h1>".into(),
    }));
    let h = Harness::new(api);

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ControllerError::UploadFailed(reason) => assert_eq!(reason, "Server Error (500)"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.controller.ui().button_state(), ButtonState::Ready);
    assert_eq!(h.controller.metrics().get_failure_count(metrics::UPLOAD), 1);
}

#[tokio::test]
async fn test_start_processing_failure() {
    let api = ScriptedApi::accepting("p1");
    *api.start.lock().unwrap() = Some(Err(ApiError::Status {
        status: 403,
        body: String::new(),
    }));
    let mut h = Harness::new(api);

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::ProcessStartFailed(_)));
    assert_eq!(h.api.progress_calls(), 0);

    let events = h.drain();
    assert_eq!(
        alerts(&events),
        vec![(AlertKind::Danger, "Processing failed to start.".to_string())]
    );
    assert_eq!(h.controller.ui().button_state(), ButtonState::Ready);
}

#[tokio::test]
async fn test_csrf_token_sent_on_mutating_calls() {
    let h = Harness::new(
        ScriptedApi::accepting("p1")
            .with_statuses(vec![Ok(StatusReport::new(JobStatus::Completed))]),
    );

    h.controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let tokens = h.api.tokens.lock().unwrap().clone();
    assert_eq!(tokens, vec![Some("tok".to_string()), Some("tok".to_string())]);
}

#[tokio::test]
async fn test_second_submit_is_refused_while_busy() {
    let h = Harness::new(ScriptedApi::accepting("p1"));
    assert!(h.controller.ui().claim_submit());

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Busy));
    assert!(h.api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
    let h = Harness::new(ScriptedApi::accepting("p1"));
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        stopper.cancel();
    });

    let outcome = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Cancelled);
    // Checks at 0s, 2s and 4s; cancelled while waiting for the 6s one.
    assert_eq!(h.api.progress_calls(), 3);
    assert_eq!(h.controller.ui().button_state(), ButtonState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let h = Harness::new(ScriptedApi::accepting("p1").with_statuses(vec![
        Err(ApiError::Timeout),
        Err(ApiError::Network("connection reset".into())),
        Ok(StatusReport::new(JobStatus::Completed)),
    ]));

    let outcome = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_success());
    let counts = h.controller.metrics();
    assert_eq!(counts.get_failure_count(metrics::PROGRESS), 2);
    assert_eq!(counts.get_success_count(metrics::PROGRESS), 1);

    // Backoff doubles: 2s after the first failure, 4s after the second.
    let times = h.api.call_times();
    assert_eq!(times[3] - times[2], Duration::from_secs(2));
    assert_eq!(times[4] - times[3], Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_transient_budget_exhausted() {
    let policy = PollPolicy {
        transient_retries: 2,
        ..PollPolicy::default()
    };
    let mut h = Harness::with_policy(
        ScriptedApi::accepting("p1").with_statuses(vec![
            Err(ApiError::Timeout),
            Err(ApiError::Timeout),
            Err(ApiError::Timeout),
            Ok(StatusReport::new(JobStatus::Completed)),
        ]),
        policy,
    );

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::PollTransportError(ApiError::Timeout)));
    assert_eq!(h.api.progress_calls(), 3);
    assert_eq!(h.controller.ui().button_state(), ButtonState::Ready);

    let shown = alerts(&h.drain());
    assert_eq!(shown.last().map(|a| a.0), Some(AlertKind::Danger));
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_poll_error_stops_at_once() {
    let h = Harness::new(ScriptedApi::accepting("p1").with_statuses(vec![Err(
        ApiError::Status {
            status: 403,
            body: String::new(),
        },
    )]));

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::PollTransportError(_)));
    assert_eq!(h.api.progress_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_max_attempts_bounds_polling() {
    let policy = PollPolicy {
        max_attempts: Some(4),
        ..PollPolicy::default()
    };
    let mut h = Harness::with_policy(ScriptedApi::accepting("p1"), policy);

    let err = h
        .controller
        .submit(report_xlsx(), &UploadOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::PollTimedOut { attempts: 4 }));
    assert_eq!(h.api.progress_calls(), 4);
    assert_eq!(h.controller.ui().button_state(), ButtonState::Ready);

    assert_eq!(
        alerts(&h.drain()),
        vec![(
            AlertKind::Danger,
            "Processing is taking too long; stopped after 4 checks.".to_string()
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_watch_follows_existing_job() {
    let h = Harness::new(
        ScriptedApi::default().with_statuses(vec![pending(), Ok(StatusReport::new(JobStatus::Completed))]),
    );

    let outcome = h
        .controller
        .watch(&ProgressId::new("77"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(
        h.api.calls(),
        vec![Call::Progress("77".into()), Call::Progress("77".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_confirmed() {
    let api = ScriptedApi::default();
    *api.delete.lock().unwrap() = Some(Ok(()));
    let mut h = Harness::new(api);

    let asked = Mutex::new(String::new());
    let confirm = |prompt: &str| {
        *asked.lock().unwrap() = prompt.to_string();
        true
    };

    let outcome = h
        .controller
        .delete_file(5, "march.xlsx", &confirm)
        .await
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Done);
    assert_eq!(
        *asked.lock().unwrap(),
        "Are you sure you want to delete \"march.xlsx\"? This action cannot be undone."
    );
    assert_eq!(h.api.calls(), vec![Call::Delete(5)]);

    h.controller.ui().settle().await;
    let events = h.drain();
    assert_eq!(
        alerts(&events),
        vec![(AlertKind::Success, "File deleted successfully.".to_string())]
    );
    assert!(events.contains(&UiEvent::Navigate("/app/files/".into())));
}

#[tokio::test]
async fn test_declined_actions_send_nothing() {
    let h = Harness::new(ScriptedApi::default());
    let decline = |_: &str| false;

    assert_eq!(
        h.controller.delete_file(1, "a.xlsx", &decline).await.unwrap(),
        ActionOutcome::Declined
    );
    assert_eq!(
        h.controller.process_file(1, &decline).await.unwrap(),
        ActionOutcome::Declined
    );
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn test_delete_failure_includes_server_text() {
    let api = ScriptedApi::default();
    *api.delete.lock().unwrap() = Some(Err(ApiError::Status {
        status: 404,
        body: "<h1>Not Found</h1>".into(),
    }));
    let mut h = Harness::new(api);

    let err = h
        .controller
        .delete_file(5, "march.xlsx", &|_: &str| true)
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::ActionFailed(_)));
    assert_eq!(
        alerts(&h.drain()),
        vec![(AlertKind::Danger, "Delete failed: Not Found".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_process_file_outcomes() {
    let api = ScriptedApi::default();
    *api.action.lock().unwrap() = Some(Ok(ActionResponse {
        success: true,
        message: Some("File processed successfully! 12 records processed.".into()),
    }));
    let mut h = Harness::new(api);

    let start = Instant::now();
    assert_eq!(
        h.controller.process_file(8, &|_: &str| true).await.unwrap(),
        ActionOutcome::Done
    );
    h.controller.ui().settle().await;
    assert_eq!(start.elapsed(), RELOAD_AFTER_PROCESS);

    let events = h.drain();
    assert_eq!(
        alerts(&events),
        vec![(AlertKind::Success, "Processing started successfully!".to_string())]
    );
    assert!(events.contains(&UiEvent::Reload));

    *h.api.action.lock().unwrap() = Some(Ok(ActionResponse {
        success: false,
        message: Some("File already processed".into()),
    }));
    let err = h.controller.process_file(8, &|_: &str| true).await.unwrap_err();
    assert_eq!(err.to_string(), "Error: File already processed");

    // Nothing scripted: the call fails at the transport level.
    let err = h.controller.process_file(8, &|_: &str| true).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "An error occurred while processing the file."
    );
}
