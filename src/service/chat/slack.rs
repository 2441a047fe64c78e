//! Chat service integration for support-bot.
//!
//! This module provides functionality for interacting with Slack:
//! - Receiving message events, over the HTTP Events API (verified with the
//!   signing secret) or over Socket Mode when an app token is configured
//! - Posting replies back to the conversation
//!
//! It implements the `GenericChatClient` trait for Slack.

use crate::{
    base::{
        config::Config,
        types::{InboundMessage, Res, Void},
    },
    interaction,
    service::{llm::LlmClient, retriever::Retriever},
};
use async_trait::async_trait;
use axum::{
    Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::{
    prelude::*,
    signature_verifier::{SlackEventAbsentSignatureError, SlackEventSignatureVerifierError},
};
use tracing::{debug, info, instrument, warn};

use std::{net::SocketAddr, sync::Arc};

use super::{ChatClient, GenericChatClient};

/// Path the Events API posts to.
pub const SLACK_EVENTS_PATH: &str = "/slack/events";

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, retriever: Retriever, llm: LlmClient) -> Res<Self> {
        let client = SlackChatClient::new(config, retriever, llm).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state shared with the slack event callbacks.
struct SlackUserState {
    retriever: Retriever,
    llm: LlmClient,
    chat: ChatClient,
    config: Config,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: Option<SlackApiToken>,
    pub bot_token: SlackApiToken,
    pub signing_secret: SlackSigningSecret,
    pub port: u16,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    pub retriever: Retriever,
    pub llm: LlmClient,
    pub config: Config,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, retriever: Retriever, llm: LlmClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = config.slack_app_token.as_ref().map(|token| SlackApiToken::new(SlackApiTokenValue(token.clone())));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));
        let signing_secret: SlackSigningSecret = config.slack_signing_secret.clone().into();

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            signing_secret,
            port: config.port,
            bot_user_id,
            client,
            retriever,
            llm,
            config: config.clone(),
        })
    }

    fn user_state(&self) -> Arc<SlackUserState> {
        Arc::new(SlackUserState {
            retriever: self.retriever.clone(),
            llm: self.llm.clone(),
            chat: ChatClient::from(self.clone()),
            config: self.config.clone(),
        })
    }

    /// Receive events over a Socket Mode websocket.
    async fn start_socket_mode(&self, app_token: &SlackApiToken) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(
            SlackClientEventsListenerEnvironment::new(self.client.clone())
                .with_error_handler(handle_listener_error)
                .with_user_state(self.user_state()),
        );

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(app_token).await?;

        info!("Listening for Slack events over Socket Mode.");

        // Start WS connections calling Slack API to get WS url for the token,
        // and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    /// Receive events over the HTTP Events API on the configured port.
    async fn start_events_api(&self) -> Void {
        let app = events_router(self.client.clone(), &self.signing_secret, self.user_state());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let tcp_listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Listening for Slack events on http://{}{}", addr, SLACK_EVENTS_PATH);

        axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down ...");
            })
            .await?;

        Ok(())
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        match &self.app_token {
            Some(app_token) => self.start_socket_mode(app_token).await,
            None => self.start_events_api().await,
        }
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let mut request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message);
        if !thread_ts.is_empty() {
            request = request.with_thread_ts(SlackTs(thread_ts.to_string()));
        }

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

/// Build the Events API router.
///
/// Requests are rejected unless their signature matches the signing secret.
fn events_router(client: Arc<FullClient>, signing_secret: &SlackSigningSecret, user_state: Arc<SlackUserState>) -> axum::Router {
    let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(client).with_error_handler(handle_events_api_error));
    let listener = SlackEventsAxumListener::new(listener_environment);

    axum::Router::new()
        .route(
            SLACK_EVENTS_PATH,
            axum::routing::post(handle_http_push_event).layer(listener.events_layer(signing_secret).with_event_extractor(SlackEventsExtractors::push_event())),
        )
        .layer(Extension(user_state))
}

// Event conversion.

/// Convert a Slack message event into a message the bot should answer.
///
/// Returns `None` for the bot's own messages, other bots, subtyped events
/// (edits, deletions, joins, ...) and messages without text.
fn inbound_message(event: &SlackMessageEvent, bot_user_id: &str) -> Option<InboundMessage> {
    if event.subtype.is_some() || event.sender.bot_id.is_some() {
        return None;
    }

    let user_id = event.sender.user.as_ref()?;
    if user_id.0 == bot_user_id {
        return None;
    }

    let channel_id = event.origin.channel.as_ref()?.0.clone();
    let text = event.content.as_ref()?.text.clone()?;
    if text.trim().is_empty() {
        return None;
    }

    Some(InboundMessage {
        channel_id,
        ts: event.origin.ts.0.clone(),
        thread_ts: event.origin.thread_ts.as_ref().map(|ts| ts.0.clone()),
        text,
    })
}

/// Route a push event to the interaction layer.
fn dispatch_push_event(event_callback: SlackPushEventCallback, user_state: &SlackUserState) {
    match event_callback.event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            info!("Received message event ...");

            let Some(message) = inbound_message(&slack_message_event, user_state.chat.bot_user_id()) else {
                debug!("Skipping message event that does not need a reply.");
                return;
            };

            interaction::chat_event::handle_chat_event(
                message,
                user_state.retriever.clone(),
                user_state.llm.clone(),
                user_state.chat.clone(),
                user_state.config.clone(),
            );
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }
}

// HTTP Events API handler.

/// Handles verified push events delivered over HTTP.
#[instrument(skip_all)]
async fn handle_http_push_event(Extension(user_state): Extension<Arc<SlackUserState>>, Extension(event): Extension<SlackPushEvent>) -> Response {
    match event {
        SlackPushEvent::UrlVerification(verification) => {
            info!("Answering URL verification challenge.");
            verification.challenge.into_response()
        }
        SlackPushEvent::EventCallback(event_callback) => {
            dispatch_push_event(event_callback, &user_state);
            StatusCode::OK.into_response()
        }
        _ => {
            warn!("Received unhandled HTTP push event.");
            StatusCode::OK.into_response()
        }
    }
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    warn!("[COMMAND] {:#?}", event);
    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text("No app commands are currently supported.".into())))
}

/// Handles interaction events from Slack.
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    warn!("[INTERACTION] {:#?}", event);
    Ok(())
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<Arc<SlackUserState>>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    dispatch_push_event(event_callback, user_state);

    Ok(())
}

/// Logs listener errors and acknowledges the event.
fn handle_listener_error(err: Box<dyn std::error::Error + Send + Sync>, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> HttpStatusCode {
    warn!("Slack listener error: {}", err);
    HttpStatusCode::OK
}

/// Logs Events API errors; unsigned or mis-signed requests are refused.
fn handle_events_api_error(err: Box<dyn std::error::Error + Send + Sync>, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> HttpStatusCode {
    warn!("Slack events request rejected: {}", err);
    events_api_error_status(err.as_ref())
}

fn events_api_error_status(err: &(dyn std::error::Error + Send + Sync + 'static)) -> HttpStatusCode {
    if err.is::<SlackEventSignatureVerifierError>() || err.is::<SlackEventAbsentSignatureError>() {
        HttpStatusCode::UNAUTHORIZED
    } else {
        HttpStatusCode::BAD_REQUEST
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use axum::{body::Body, http::Request};
    use hmac::{Hmac, Mac};
    use mockall::mock;
    use serde_json::json;
    use sha2::Sha256;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        base::{
            config::ConfigInner,
            prompts::SUPPORT_PROMPT_TEMPLATE,
            types::{InferenceResult, RetrievedDocument},
        },
        service::{llm::GenericLlmClient, retriever::GenericRetriever},
    };

    const BOT_USER_ID: &str = "UBOT";
    const SIGNING_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    mock! {
        pub Chat {}

        #[async_trait]
        impl GenericChatClient for Chat {
            fn bot_user_id(&self) -> &str;
            async fn start(&self) -> Void;
            async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;
        }
    }

    mock! {
        pub Llm {}

        #[async_trait]
        impl GenericLlmClient for Llm {
            async fn infer(&self, prompt: &str) -> InferenceResult;
        }
    }

    mock! {
        pub DocumentIndex {}

        #[async_trait]
        impl GenericRetriever for DocumentIndex {
            async fn retrieve(&self, query: &str) -> Res<Vec<RetrievedDocument>>;
        }
    }

    fn event(value: serde_json::Value) -> SlackMessageEvent {
        serde_json::from_value(value).unwrap()
    }

    fn slack_client() -> Arc<FullClient> {
        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        let https_connector = HttpsConnector::<HttpConnector>::builder().with_tls_config(tls).https_only().enable_all_versions().build();

        Arc::new(slack_morphism::SlackClient::new(SlackClientHyperConnector::with_connector(https_connector)))
    }

    fn user_state(retriever: MockDocumentIndex, llm: MockLlm, chat: MockChat) -> Arc<SlackUserState> {
        Arc::new(SlackUserState {
            retriever: Retriever::new(Arc::new(retriever)),
            llm: LlmClient::new(Arc::new(llm)),
            chat: ChatClient::new(Arc::new(chat)),
            config: Config {
                inner: Arc::new(ConfigInner {
                    max_iterations: 4,
                    request_timeout_secs: 5,
                    retrieval_top_k: 4,
                    prompt_template: SUPPORT_PROMPT_TEMPLATE.to_string(),
                    ..Default::default()
                }),
            },
        })
    }

    fn router(retriever: MockDocumentIndex, llm: MockLlm, chat: MockChat) -> axum::Router {
        events_router(slack_client(), &SIGNING_SECRET.to_string().into(), user_state(retriever, llm, chat))
    }

    fn signed_request(body: &str, secret: &str) -> Request<Body> {
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs().to_string();

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("v0:{ts}:{body}").as_bytes());
        let signature = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

        Request::builder()
            .method("POST")
            .uri(SLACK_EVENTS_PATH)
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", ts)
            .header("x-slack-signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn message_event_body() -> String {
        json!({
            "type": "event_callback",
            "team_id": "T0001",
            "api_app_id": "A0001",
            "event_id": "Ev0001",
            "event_time": 1700000000,
            "event": {
                "type": "message",
                "channel": "C123",
                "user": "U456",
                "text": "Is delivery free?",
                "ts": "1700000000.000200",
            },
        })
        .to_string()
    }

    /// A chat double that must never be consulted.
    fn untouched_chat() -> MockChat {
        let mut chat = MockChat::new();
        chat.expect_bot_user_id().never();
        chat.expect_send_message().never();
        chat
    }

    fn untouched_retriever() -> MockDocumentIndex {
        let mut retriever = MockDocumentIndex::new();
        retriever.expect_retrieve().never();
        retriever
    }

    #[tokio::test]
    async fn test_url_verification_returns_challenge() {
        let body = json!({
            "token": "Jhj5dZrVaK7ZwHHjRyZWjbDl",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P",
            "type": "url_verification",
        })
        .to_string();

        let response = router(untouched_retriever(), MockLlm::new(), untouched_chat()).oneshot(signed_request(&body, SIGNING_SECRET)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P");
    }

    #[tokio::test]
    async fn test_wrongly_signed_event_is_rejected() {
        let response = router(untouched_retriever(), MockLlm::new(), untouched_chat())
            .oneshot(signed_request(&message_event_body(), "not-the-signing-secret"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unsigned_event_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri(SLACK_EVENTS_PATH)
            .header("content-type", "application/json")
            .body(Body::from(message_event_body()))
            .unwrap();

        let response = router(untouched_retriever(), MockLlm::new(), untouched_chat()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_a_bad_request() {
        let response = router(untouched_retriever(), MockLlm::new(), untouched_chat())
            .oneshot(signed_request("not json", SIGNING_SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signed_message_event_is_answered_once() {
        let mut retriever = MockDocumentIndex::new();
        retriever
            .expect_retrieve()
            .times(1)
            .withf(|query| query == "Is delivery free?")
            .returning(|_| Ok(vec![RetrievedDocument::new("Saatva offers free white glove delivery.", 0.93)]));

        let mut llm = MockLlm::new();
        llm.expect_infer().times(1).returning(|_| Ok(" Yes, delivery is free.\n===".to_string()));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(String, String, String)>();

        let mut chat = MockChat::new();
        chat.expect_bot_user_id().return_const(BOT_USER_ID.to_string());
        chat.expect_send_message().times(1).returning(move |channel_id, thread_ts, text| {
            let _ = tx.send((channel_id.to_string(), thread_ts.to_string(), text.to_string()));
            Ok(())
        });

        let response = router(retriever, llm, chat).oneshot(signed_request(&message_event_body(), SIGNING_SECRET)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(reply, ("C123".to_string(), String::new(), " Yes, delivery is free.\n".to_string()));
    }

    #[tokio::test]
    async fn test_own_message_event_is_not_answered() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let mut retriever = MockDocumentIndex::new();
        retriever.expect_retrieve().returning(move |query| {
            let _ = tx.send(query.to_string());
            Ok(vec![])
        });

        // The bot's own user id comes from the chat client.
        let mut chat = MockChat::new();
        chat.expect_bot_user_id().times(1).return_const("U456".to_string());
        chat.expect_send_message().never();

        let response = router(retriever, MockLlm::new(), chat).oneshot(signed_request(&message_event_body(), SIGNING_SECRET)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_signature_errors_map_to_unauthorized() {
        let err: Box<dyn std::error::Error + Send + Sync> = Box::new(SlackEventAbsentSignatureError::new());

        assert_eq!(events_api_error_status(err.as_ref()), HttpStatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_other_listener_errors_map_to_bad_request() {
        let err: Box<dyn std::error::Error + Send + Sync> = anyhow::anyhow!("unexpected payload").into();

        assert_eq!(events_api_error_status(err.as_ref()), HttpStatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_user_message_is_answered() {
        let message = inbound_message(
            &event(json!({
                "type": "message",
                "channel": "C123",
                "user": "U456",
                "text": "What sizes does the dog bed come in?",
                "ts": "1700000000.000200",
            })),
            BOT_USER_ID,
        )
        .unwrap();

        assert_eq!(
            message,
            InboundMessage {
                channel_id: "C123".to_string(),
                ts: "1700000000.000200".to_string(),
                thread_ts: None,
                text: "What sizes does the dog bed come in?".to_string(),
            }
        );
    }

    #[test]
    fn test_thread_reply_keeps_thread() {
        let message = inbound_message(
            &event(json!({
                "type": "message",
                "channel": "C123",
                "user": "U456",
                "text": "And the large one?",
                "ts": "1700000000.000300",
                "thread_ts": "1700000000.000200",
            })),
            BOT_USER_ID,
        )
        .unwrap();

        assert_eq!(message.thread_ts.as_deref(), Some("1700000000.000200"));
    }

    #[test]
    fn test_own_messages_are_skipped() {
        let message = inbound_message(
            &event(json!({
                "type": "message",
                "channel": "C123",
                "user": BOT_USER_ID,
                "text": "The Saatva Dog Bed comes in three sizes.",
                "ts": "1700000000.000400",
            })),
            BOT_USER_ID,
        );

        assert!(message.is_none());
    }

    #[test]
    fn test_bot_messages_are_skipped() {
        let message = inbound_message(
            &event(json!({
                "type": "message",
                "channel": "C123",
                "user": "U789",
                "bot_id": "B001",
                "text": "Deploy finished.",
                "ts": "1700000000.000500",
            })),
            BOT_USER_ID,
        );

        assert!(message.is_none());
    }

    #[test]
    fn test_subtyped_events_are_skipped() {
        let message = inbound_message(
            &event(json!({
                "type": "message",
                "subtype": "channel_join",
                "channel": "C123",
                "user": "U456",
                "text": "<@U456> has joined the channel",
                "ts": "1700000000.000600",
            })),
            BOT_USER_ID,
        );

        assert!(message.is_none());
    }

    #[test]
    fn test_blank_messages_are_skipped() {
        let message = inbound_message(
            &event(json!({
                "type": "message",
                "channel": "C123",
                "user": "U456",
                "text": "   ",
                "ts": "1700000000.000700",
            })),
            BOT_USER_ID,
        );

        assert!(message.is_none());
    }
}
