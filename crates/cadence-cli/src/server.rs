use std::sync::Arc;

use chrono::NaiveDate;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use cadence_core::{AttemptOutcome, EngineError};
use cadence_store::Config;

use crate::ops::{AppEngine, calendar_window, due_entries, record_review, with_retry};

#[derive(Clone)]
pub struct CadenceServer {
    state: Arc<Mutex<ServerState>>,
    tool_router: ToolRouter<Self>,
}

struct ServerState {
    engine: AppEngine,
    config: Config,
}

impl CadenceServer {
    pub fn new(engine: AppEngine, config: Config) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState { engine, config })),
            tool_router: Self::tool_router(),
        }
    }

    /// Truncate the WAL before the process exits.
    pub async fn checkpoint_wal(&self) {
        let state = self.state.lock().await;
        match state.engine.store().checkpoint_truncate() {
            Ok(()) => tracing::info!("WAL checkpoint complete"),
            Err(e) => tracing::warn!("WAL checkpoint failed: {e}"),
        }
    }
}

fn engine_error(err: EngineError) -> McpError {
    match err {
        EngineError::InvalidInput(_) | EngineError::UnknownSchedule { .. } => {
            McpError::invalid_params(err.to_string(), None)
        }
        other => McpError::internal_error(other.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, McpError> {
    value
        .map(|s| {
            s.parse::<NaiveDate>().map_err(|e| {
                McpError::invalid_params(
                    format!("{field} must be YYYY-MM-DD, got '{s}': {e}"),
                    None,
                )
            })
        })
        .transpose()
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct ReviewRequest {
    learner_id: String,
    item_id: String,
    /// Topic the item belongs to. When omitted, the topic stored on the
    /// item's schedule (if any) receives the mastery update.
    topic: Option<String>,
    /// Whether the learner answered correctly
    correct: bool,
    /// Seconds taken to answer
    response_time_seconds: Option<f64>,
    /// Self-reported confidence in [0, 1]
    confidence: Option<f64>,
    /// A 0-5 quality to use as-is instead of deriving one
    quality: Option<f64>,
    /// Emotion label observed during the attempt (e.g. "happy", "frustrated")
    emotion: Option<String>,
}

impl ReviewRequest {
    fn outcome(&self) -> AttemptOutcome {
        AttemptOutcome {
            correct: self.correct,
            response_time_seconds: self.response_time_seconds,
            confidence: self.confidence,
            explicit_quality: self.quality,
            emotion: self.emotion.clone(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicAttemptRequest {
    learner_id: String,
    topic: String,
    correct: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DueRequest {
    learner_id: String,
    /// Maximum number of items (defaults to the configured due_limit)
    limit: Option<usize>,
    /// Order by days overdue, most overdue first
    #[serde(default)]
    overdue_first: bool,
    /// Only items whose due time has already passed
    #[serde(default)]
    overdue_only: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CalendarRequest {
    learner_id: String,
    /// First day (YYYY-MM-DD, UTC). Defaults to today.
    from: Option<String>,
    /// Last day (YYYY-MM-DD, UTC). Defaults to from + calendar_days.
    to: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LearnerRequest {
    learner_id: String,
}

#[tool_router]
impl CadenceServer {
    #[tool(
        description = "Record one learner attempt on an item. Scores the outcome on the 0-5 SM-2 scale, advances the item's review schedule, and updates the learner's topic mastery when a topic is known. Returns the score, the updated schedule and the updated mastery record."
    )]
    async fn cadence_review(
        &self,
        Parameters(req): Parameters<ReviewRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let result = record_review(
            &state.engine,
            state.config.max_retries,
            &req.learner_id,
            &req.item_id,
            req.topic.as_deref(),
            &req.outcome(),
        )
        .map_err(engine_error)?;
        json_result(&result)
    }

    #[tool(
        description = "Record a correct or incorrect attempt against a topic without touching any item schedule. Returns the updated mastery record (score 0-100 and band)."
    )]
    async fn cadence_topic_attempt(
        &self,
        Parameters(req): Parameters<TopicAttemptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let record = with_retry(state.config.max_retries, || {
            state
                .engine
                .record_topic_attempt(&req.learner_id, &req.topic, req.correct)
        })
        .map_err(engine_error)?;
        json_result(&record)
    }

    #[tool(
        description = "List items due for review now, oldest due first, each with the number of whole days it is overdue."
    )]
    async fn cadence_due(
        &self,
        Parameters(req): Parameters<DueRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let limit = req.limit.unwrap_or(state.config.due_limit);
        let items = due_entries(
            &state.engine,
            &req.learner_id,
            limit,
            req.overdue_first,
            req.overdue_only,
        )
        .map_err(engine_error)?;
        json_result(&serde_json::json!({
            "count": items.len(),
            "items": items,
        }))
    }

    #[tool(description = "Upcoming reviews grouped by UTC date over a range of days.")]
    async fn cadence_calendar(
        &self,
        Parameters(req): Parameters<CalendarRequest>,
    ) -> Result<CallToolResult, McpError> {
        let from = parse_date("from", req.from.as_deref())?;
        let to = parse_date("to", req.to.as_deref())?;

        let state = self.state.lock().await;
        let (from, to, days) = calendar_window(
            &state.engine,
            &req.learner_id,
            from,
            to,
            state.config.calendar_days,
        )
        .map_err(engine_error)?;
        json_result(&serde_json::json!({
            "from": from,
            "to": to,
            "days": days,
        }))
    }

    #[tool(
        description = "Revision statistics for a learner: totals, due and overdue counts, average easiness, topic distribution, plus emotion insights from review history."
    )]
    async fn cadence_stats(
        &self,
        Parameters(req): Parameters<LearnerRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let stats = state.engine.stats(&req.learner_id).map_err(engine_error)?;
        let emotions = state.engine.insights(&req.learner_id).map_err(engine_error)?;
        json_result(&serde_json::json!({
            "stats": stats,
            "emotions": emotions,
        }))
    }

    #[tool(
        description = "Mastery profile for a learner: per-topic scores and bands, with strengths, weaknesses and improving topics."
    )]
    async fn cadence_profile(
        &self,
        Parameters(req): Parameters<LearnerRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let profile = state.engine.profile(&req.learner_id).map_err(engine_error)?;
        json_result(&profile)
    }
}

#[tool_handler]
impl ServerHandler for CadenceServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Adaptive review scheduling for learners.\n\n\
                 After each learner attempt, call cadence_review with the outcome. \
                 Use cadence_due to pick what to practise next and cadence_calendar to plan ahead. \
                 cadence_topic_attempt records topic-level practice that has no item. \
                 cadence_stats and cadence_profile summarise progress."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Clock, Engine, FixedClock};
    use cadence_store::Store;
    use chrono::{TimeZone, Utc};

    fn make_server() -> CadenceServer {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap(),
        ));
        let engine = Engine::new(Store::open_in_memory().unwrap(), clock);
        CadenceServer::new(engine, Config::default())
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> serde_json::Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    fn review(item: &str, topic: Option<&str>, correct: bool) -> ReviewRequest {
        ReviewRequest {
            learner_id: "ann".to_string(),
            item_id: item.to_string(),
            topic: topic.map(str::to_string),
            correct,
            response_time_seconds: Some(4.0),
            confidence: None,
            quality: None,
            emotion: Some("happy".to_string()),
        }
    }

    fn learner() -> Parameters<LearnerRequest> {
        Parameters(LearnerRequest {
            learner_id: "ann".to_string(),
        })
    }

    #[tokio::test]
    async fn test_review_creates_schedule_and_mastery() {
        let server = make_server();
        let result = server
            .cadence_review(Parameters(review("q1", Some("algebra"), true)))
            .await
            .unwrap();

        let json = parse_result(&result);
        assert_eq!(json["quality"]["quality"], 5.0);
        assert_eq!(json["schedule"]["repetitions"], 1);
        assert_eq!(json["schedule"]["interval_days"], 1);
        assert_eq!(json["schedule"]["topic"], "algebra");
        assert_eq!(json["mastery"]["mastery_score"], 100.0);
    }

    #[tokio::test]
    async fn test_review_rejects_bad_quality() {
        let server = make_server();
        let mut req = review("q1", None, true);
        req.quality = Some(9.0);
        let err = server.cadence_review(Parameters(req)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_topic_attempt() {
        let server = make_server();
        for correct in [true, false] {
            server
                .cadence_topic_attempt(Parameters(TopicAttemptRequest {
                    learner_id: "ann".to_string(),
                    topic: "physics".to_string(),
                    correct,
                }))
                .await
                .unwrap();
        }
        let profile = parse_result(&server.cadence_profile(learner()).await.unwrap());
        assert_eq!(profile["total_topics"], 1);
        assert_eq!(profile["topics"][0]["total_attempts"], 2);
        assert_eq!(profile["topics"][0]["mastery_score"], 50.0);
    }

    #[tokio::test]
    async fn test_due_empty_then_populated() {
        let server = make_server();
        let due = |limit| {
            Parameters(DueRequest {
                learner_id: "ann".to_string(),
                limit,
                overdue_first: false,
                overdue_only: false,
            })
        };

        let json = parse_result(&server.cadence_due(due(None)).await.unwrap());
        assert_eq!(json["count"], 0);

        // A failed attempt is due again tomorrow; pull it back a day.
        for item in ["q1", "q2"] {
            server
                .cadence_review(Parameters(review(item, None, false)))
                .await
                .unwrap();
            let state = server.state.lock().await;
            state.engine.reschedule("ann", item, -1).unwrap();
        }

        let json = parse_result(&server.cadence_due(due(Some(1))).await.unwrap());
        assert_eq!(json["count"], 1);
        assert_eq!(json["items"][0]["record"]["item_id"], "q1");
        assert_eq!(json["items"][0]["overdue_days"], 0);
    }

    #[tokio::test]
    async fn test_calendar_groups_by_day() {
        let server = make_server();
        server
            .cadence_review(Parameters(review("q1", None, true)))
            .await
            .unwrap();

        let json = parse_result(
            &server
                .cadence_calendar(Parameters(CalendarRequest {
                    learner_id: "ann".to_string(),
                    from: None,
                    to: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["from"], "2026-06-01");
        assert_eq!(json["to"], "2026-06-08");
        assert_eq!(json["days"]["2026-06-02"][0]["item_id"], "q1");
    }

    #[tokio::test]
    async fn test_calendar_rejects_bad_date() {
        let server = make_server();
        let err = server
            .cadence_calendar(Parameters(CalendarRequest {
                learner_id: "ann".to_string(),
                from: Some("June 1st".to_string()),
                to: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_stats_after_reviews() {
        let server = make_server();
        server
            .cadence_review(Parameters(review("q1", Some("algebra"), true)))
            .await
            .unwrap();
        server
            .cadence_review(Parameters(review("q2", None, false)))
            .await
            .unwrap();

        let json = parse_result(&server.cadence_stats(learner()).await.unwrap());
        assert_eq!(json["stats"]["total"], 2);
        assert_eq!(json["stats"]["topic_distribution"]["algebra"], 1);
        assert_eq!(json["stats"]["topic_distribution"]["untagged"], 1);
        assert_eq!(json["emotions"]["emotion_counts"]["happy"], 2);
    }

    #[test]
    fn test_tool_registration() {
        let server = make_server();
        let info = server.get_info();

        assert!(info.instructions.is_some());
        assert!(info.capabilities.tools.is_some());
    }
}
