use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use ttb_core::{
    bot::{Bot, BotControl, BotDeps, SessionExit},
    config::{ConfigStore, MemoryStore, Settings},
    domain::{ChannelId, Recipient, UserId, UserRights},
    history::{ContextHistory, HistoryEntry},
    lifecycle::Phase,
    logging::LogHandle,
    ports::{AiService, QuoteService, Services, WeatherService},
    session::{Feature, StatusSnapshot},
    transport::{local::user, LocalTransport, Outbound, TransportEvent},
};

const BOT: UserId = UserId(1);
const BOSS: UserId = UserId(2);
const EVE: UserId = UserId(3);
const ROOT: ChannelId = ChannelId(1);

// ============== Fakes ==============

#[derive(Default)]
struct FakeAi {
    prompts: Mutex<Vec<(String, usize)>>,
}

impl FakeAi {
    fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiService for FakeAi {
    fn is_enabled(&self) -> bool {
        true
    }
    fn current_model(&self) -> String {
        "fake-model".to_string()
    }
    async fn generate(&self, prompt: &str, history: &[HistoryEntry]) -> String {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), history.len()));
        if prompt == "long" {
            return "word ".repeat(200).trim_end().to_string();
        }
        format!("echo: {prompt}")
    }
    async fn generate_welcome(&self, nickname: &str) -> String {
        format!("AI welcome for {nickname}")
    }
    async fn list_models(&self) -> Vec<String> {
        vec!["fake-model".to_string()]
    }
    async fn set_model(&self, _name: &str) -> bool {
        true
    }
    async fn set_api_key(&self, key: &str) -> bool {
        key == "good-key"
    }
    fn set_system_instructions(&self, _text: &str) {}
    fn set_welcome_instructions(&self, _text: &str) {}
}

#[derive(Default)]
struct FakeWeather {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl WeatherService for FakeWeather {
    fn is_enabled(&self) -> bool {
        true
    }
    async fn weather(&self, location: &str) -> String {
        self.calls.lock().unwrap().push(location.to_string());
        format!("Sunny in {location}")
    }
}

struct FakeQuotes;

#[async_trait]
impl QuoteService for FakeQuotes {
    fn is_enabled(&self) -> bool {
        true
    }
    async fn random_quote(&self, lang: &str) -> String {
        format!("random quote ({lang})")
    }
    async fn quote_by_id(&self, id: u32, lang: &str) -> String {
        format!("quote {id} ({lang})")
    }
    async fn today_events(&self, country: &str) -> String {
        format!("today in {country}")
    }
    async fn events_by_date(&self, country: &str, date: &str) -> String {
        format!("date {date} in {country}")
    }
    async fn events_by_week(&self, country: &str, date: &str) -> String {
        format!("week {date} in {country}")
    }
    async fn events_by_month(&self, country: &str, month: &str) -> String {
        format!("month {month} in {country}")
    }
    async fn events_by_year(&self, country: &str, year: &str) -> String {
        format!("year {year} in {country}")
    }
    async fn search_events(&self, country: &str, query: &str) -> String {
        format!("search {query} in {country}")
    }
    async fn set_api_key(&self, _key: &str) -> bool {
        false
    }
}

// ============== Harness ==============

struct Harness {
    transport: Arc<LocalTransport>,
    store: Arc<MemoryStore>,
    ai: Arc<FakeAi>,
    weather: Arc<FakeWeather>,
    status: watch::Receiver<StatusSnapshot>,
    control: mpsc::Sender<BotControl>,
    cancel: CancellationToken,
    task: JoinHandle<SessionExit>,
}

fn base_settings() -> Settings {
    let mut settings = Settings::default();
    settings.bot.admin_usernames = vec!["boss".to_string()];
    settings.bot.reconnect_delay_min = 1;
    settings.bot.reconnect_delay_max = 1;
    settings
}

async fn start(settings: Settings) -> Harness {
    let transport = Arc::new(LocalTransport::new(
        BOT,
        UserRights::KICK_USERS | UserRights::BAN_USERS | UserRights::MOVE_USERS,
    ));
    transport.add_channel(ChannelId(2), ROOT, "Lobby");
    transport.add_user(user(2, "Boss", "boss", ROOT));
    transport.add_user(user(3, "Eve", "eve", ROOT));

    let store = Arc::new(MemoryStore::new(settings.clone()));
    let ai = Arc::new(FakeAi::default());
    let weather = Arc::new(FakeWeather::default());
    let history = Arc::new(ContextHistory::new(60, 40));
    let (status_tx, status) = watch::channel(StatusSnapshot::default());

    let bot = Bot::new(
        settings,
        BotDeps {
            transport: transport.clone(),
            services: Services {
                ai: ai.clone(),
                weather: weather.clone(),
                quotes: Arc::new(FakeQuotes),
            },
            history,
            store: store.clone() as Arc<dyn ConfigStore>,
            log: LogHandle::noop(),
            status: status_tx,
        },
    );

    let (control, control_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(bot.run(control_rx, cancel.clone()));

    let harness = Harness {
        transport,
        store,
        ai,
        weather,
        status,
        control,
        cancel,
        task,
    };
    harness.wait_phase(Phase::InChannel).await;
    harness
}

impl Harness {
    async fn wait_phase(&self, phase: Phase) {
        let mut rx = self.status.clone();
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| s.phase == phase))
            .await
            .expect("phase not reached")
            .expect("status channel closed");
    }

    fn pm(&self, from: UserId, text: &str) {
        self.transport.say(from, Recipient::User(BOT), text);
    }

    fn chan(&self, from: UserId, text: &str) {
        self.transport.say(from, Recipient::Channel(ROOT), text);
    }

    fn texts(&self, to: Recipient) -> Vec<String> {
        self.transport.texts_to(to)
    }

    async fn expect(&self, to: Recipient, text: &str) {
        for _ in 0..200 {
            if self.texts(to).iter().any(|t| t == text) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{text:?} never sent to {to:?}; got {:?}", self.texts(to));
    }

    /// Let the worker drain its queue.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    async fn stop(self) -> SessionExit {
        self.cancel.cancel();
        self.task.await.unwrap()
    }
}

fn to(user: UserId) -> Recipient {
    Recipient::User(user)
}

fn channel() -> Recipient {
    Recipient::Channel(ROOT)
}

// ============== Tests ==============

#[tokio::test(start_paused = true)]
async fn connects_logs_in_and_joins_target_channel() {
    let h = start(base_settings()).await;
    let out = h.transport.outbound();
    assert!(matches!(out[0], Outbound::Connect { .. }));
    assert!(out.iter().any(|o| matches!(o, Outbound::Login { .. })));
    assert!(out
        .iter()
        .any(|o| matches!(o, Outbound::Join { channel_id, .. } if *channel_id == ROOT)));
    assert_eq!(h.stop().await, SessionExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn ping_and_unknown_commands() {
    let h = start(base_settings()).await;
    h.pm(EVE, "ping");
    h.expect(to(EVE), "Pong!").await;

    h.pm(EVE, "doesnotexist");
    h.settle().await;
    assert_eq!(h.texts(to(EVE)), vec!["Pong!".to_string()]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn admin_commands_require_admin() {
    let h = start(base_settings()).await;
    h.pm(EVE, "kick Boss");
    h.expect(to(EVE), "Error: You are not authorized to use 'kick'.")
        .await;
    assert!(!h
        .transport
        .outbound()
        .iter()
        .any(|o| matches!(o, Outbound::Kick { .. })));

    h.pm(BOSS, "kick Eve");
    h.expect(to(BOSS), "Kick command sent for 'Eve'.").await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn lock_suppresses_commands_and_channel_output() {
    let h = start(base_settings()).await;
    h.pm(BOSS, "lock");
    h.expect(to(BOSS), "Bot lock is now ON.").await;

    h.pm(EVE, "ping");
    h.expect(to(EVE), "Command ignored; bot is locked.").await;

    h.chan(EVE, "/w Paris");
    h.settle().await;
    assert!(h.weather.calls.lock().unwrap().is_empty());
    assert!(h.texts(channel()).is_empty());

    h.pm(BOSS, "info");
    h.settle().await;
    assert!(h.texts(to(BOSS)).iter().any(|t| t.contains("Locked: YES")));

    h.pm(BOSS, "lock");
    h.expect(to(BOSS), "Bot lock is now OFF.").await;
    h.pm(EVE, "ping");
    h.expect(to(EVE), "Pong!").await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn blocked_commands_are_refused() {
    let h = start(base_settings()).await;
    h.pm(BOSS, "block w");
    h.expect(to(BOSS), "Command 'w' has been BLOCKED.").await;

    h.pm(EVE, "w Paris");
    h.expect(to(EVE), "Command 'w' is blocked.").await;
    h.chan(EVE, "/w Paris");
    h.settle().await;
    assert!(h.weather.calls.lock().unwrap().is_empty());

    h.pm(BOSS, "block h");
    h.expect(to(BOSS), "Error: Command 'h' cannot be blocked.")
        .await;
    h.pm(BOSS, "block");
    h.expect(to(BOSS), "Usage: block <command>\nCurrently blocked: w")
        .await;

    h.pm(BOSS, "unblock w");
    h.expect(to(BOSS), "Command 'w' has been UNBLOCKED.").await;
    h.chan(EVE, "/w Paris");
    h.expect(channel(), "Sunny in Paris").await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn weather_replies_to_origin() {
    let h = start(base_settings()).await;
    h.pm(EVE, "w Oslo");
    h.expect(to(EVE), "Sunny in Oslo").await;
    h.chan(EVE, "w Bergen");
    h.expect(channel(), "Sunny in Bergen").await;
    h.pm(EVE, "w");
    h.expect(to(EVE), "Usage: w <location> OR /w <location>").await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn poll_lifecycle() {
    let h = start(base_settings()).await;
    h.pm(EVE, r#"poll "Lunch?" "Pizza" "Sushi""#);
    h.expect(to(EVE), "Poll #1 created in channel.").await;
    assert!(h
        .texts(channel())
        .iter()
        .any(|t| t.starts_with("--- Poll #1 Created ---")));

    h.pm(BOSS, "vote 1 2");
    h.expect(to(BOSS), "Vote for 'Sushi' in Poll #1 recorded.")
        .await;
    h.pm(BOSS, "vote 1 9");
    h.expect(to(BOSS), "Error: Invalid option. Choose 1-2.").await;
    h.pm(BOSS, "vote 7 1");
    h.expect(to(BOSS), "Error: Poll #7 not found.").await;

    h.pm(EVE, "results");
    h.expect(to(EVE), "Active Polls: 1. Usage: results <poll_id>")
        .await;
    h.pm(EVE, "results 1");
    h.settle().await;
    let results = h.texts(to(EVE));
    let last = results.last().unwrap();
    assert!(last.contains("Total Votes: 1"));
    assert!(last.contains(" 2. Sushi - 1 votes (100.0%)"));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn word_filter_warns_then_kicks() {
    let mut settings = base_settings();
    settings.bot.filtered_words = vec!["darn".to_string()];
    let h = start(settings).await;

    h.chan(EVE, "oh darn");
    h.expect(
        channel(),
        "Warning 1/3 for Eve: Please avoid inappropriate language.",
    )
    .await;
    h.chan(EVE, "Darn it");
    h.chan(EVE, "/w darn");
    h.expect(channel(), "User Eve kicked after 3 warnings.").await;

    assert!(h.weather.calls.lock().unwrap().is_empty());
    assert!(h
        .transport
        .outbound()
        .iter()
        .any(|o| matches!(o, Outbound::Kick { user_id, .. } if *user_id == EVE)));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn word_filter_without_kick_right() {
    let mut settings = base_settings();
    settings.bot.filtered_words = vec!["darn".to_string()];
    let h = start(settings).await;
    h.transport.set_rights(UserRights::NONE);
    h.transport.inject(TransportEvent::LoggedIn {
        user_id: BOT,
        rights: UserRights::NONE,
    });
    h.wait_phase(Phase::InChannel).await;

    for _ in 0..3 {
        h.chan(EVE, "darn");
    }
    h.expect(channel(), "Eve has 3 warnings, but bot cannot kick.")
        .await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn long_pm_is_reassembled_before_dispatch() {
    let h = start(base_settings()).await;
    let question = "why ".repeat(200);
    h.pm(EVE, &format!("c {question}"));
    h.expect(to(EVE), "[Bot] Asking Gemini...").await;
    h.settle().await;

    let prompts = h.ai.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].0, question.trim());
    // The triggering line is not repeated as context.
    assert_eq!(prompts[0].1, 0);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn long_replies_are_chunked() {
    let h = start(base_settings()).await;
    h.pm(EVE, "c long");
    h.settle().await;
    let parts: Vec<String> = h
        .texts(to(EVE))
        .into_iter()
        .filter(|t| t.starts_with("word"))
        .collect();
    assert!(parts.len() >= 2);
    assert!(parts.iter().all(|p| p.chars().count() < 512));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn channel_ai_keeps_per_user_context() {
    let h = start(base_settings()).await;
    h.chan(EVE, "/c hello");
    h.expect(channel(), "[Bot] Asking Gemini for Eve...").await;
    h.expect(channel(), "Answering Eve: echo: hello").await;

    h.chan(EVE, "/c again");
    h.expect(channel(), "Answering Eve: echo: again").await;
    let prompts = h.ai.prompts();
    assert_eq!(prompts[0].1, 0);
    assert_eq!(prompts[1].1, 2);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn ai_toggle_and_key_management() {
    let h = start(base_settings()).await;
    h.pm(BOSS, "tg_gemini_pm");
    h.expect(to(BOSS), "Allow Gemini PM is now OFF.").await;
    h.pm(EVE, "c hi");
    h.expect(to(EVE), "[Bot] Gemini AI (PM) is disabled.").await;

    h.pm(BOSS, "gapi bad-key");
    h.expect(
        to(BOSS),
        "Gemini API key provided is invalid or failed to initialize model. Key not saved.",
    )
    .await;
    assert!(h.store.snapshot().bot.gemini_api_key.is_empty());

    h.pm(BOSS, "gapi good-key");
    h.expect(to(BOSS), "Gemini API key updated and initialized successfully.")
        .await;
    let saved = h.store.snapshot();
    assert_eq!(saved.bot.gemini_api_key, "good-key");
    assert!(saved.bot.allow_ai_pm);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn filter_words_are_persisted() {
    let h = start(base_settings()).await;
    h.pm(BOSS, "addword Heck");
    h.expect(to(BOSS), "Word 'heck' added to filter. Filter enabled.")
        .await;
    let saved = h.store.snapshot();
    assert_eq!(saved.bot.filtered_words, vec!["heck".to_string()]);
    assert_eq!(saved.bot.filter_enabled, Some(true));

    h.pm(BOSS, "delword heck");
    h.expect(to(BOSS), "Word 'heck' removed from filter.").await;
    assert_eq!(h.store.snapshot().bot.filter_enabled, Some(false));

    h.pm(BOSS, "tfilter");
    h.expect(to(BOSS), "Cannot enable filter: no words defined.")
        .await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn channel_and_broadcast_sends_respect_toggles() {
    let h = start(base_settings()).await;
    h.pm(BOSS, "ct hello all");
    h.expect(channel(), "<Boss> hello all").await;
    h.expect(to(BOSS), "Message sent to channel.").await;

    h.pm(BOSS, "tg_chanmsg");
    h.expect(to(BOSS), "Allow Channel Messages is now OFF.").await;
    h.pm(BOSS, "ct again");
    h.expect(to(BOSS), "Failed to send message (check rights/lock status).")
        .await;

    h.pm(BOSS, "bm news");
    h.expect(Recipient::Broadcast, "news").await;
    h.expect(to(BOSS), "Broadcast sent.").await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn welcomes_users_joining_the_channel() {
    let h = start(base_settings()).await;
    h.transport.user_joins(user(4, "Zed", "zed", ROOT));
    h.expect(channel(), "Welcome, Zed!").await;

    h.pm(BOSS, "tgmmode");
    h.expect(to(BOSS), "Welcome message mode set to: Gemini.").await;
    h.transport.user_joins(user(5, "Yan", "yan", ROOT));
    h.expect(channel(), "AI welcome for Yan").await;

    h.pm(BOSS, "jcl");
    h.expect(to(BOSS), "Join/Leave Announce is now OFF.").await;
    h.transport.user_joins(user(6, "Xia", "xia", ROOT));
    h.settle().await;
    assert!(!h.texts(channel()).iter().any(|t| t.contains("Xia")));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn lost_connection_reconnects_after_delay() {
    let h = start(base_settings()).await;
    h.transport.inject(TransportEvent::ConnectionLost);
    h.wait_phase(Phase::Disconnected).await;
    h.wait_phase(Phase::InChannel).await;

    let connects = h
        .transport
        .outbound()
        .iter()
        .filter(|o| matches!(o, Outbound::Connect { .. }))
        .count();
    assert_eq!(connects, 2);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn refused_connects_keep_retrying() {
    let h = start(base_settings()).await;
    h.transport.set_refuse_connect(true);
    h.transport.inject(TransportEvent::ConnectionLost);
    h.wait_phase(Phase::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let connects = h
        .transport
        .outbound()
        .iter()
        .filter(|o| matches!(o, Outbound::Connect { .. }))
        .count();
    assert!(connects >= 3, "only {connects} connect attempts");

    h.transport.set_refuse_connect(false);
    h.wait_phase(Phase::InChannel).await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_sends_are_reported() {
    let h = start(base_settings()).await;
    h.transport.set_fail_sends(true);
    h.pm(BOSS, "ct hello");
    h.settle().await;
    assert!(h.texts(channel()).is_empty());

    h.transport.set_fail_sends(false);
    h.pm(BOSS, "ct hello again");
    h.expect(to(BOSS), "Message sent to channel.").await;
    h.expect(channel(), "<Boss> hello again").await;
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn banned_account_never_reconnects() {
    let h = start(base_settings()).await;
    h.transport.inject(TransportEvent::CmdError {
        cmd_id: ttb_core::domain::CmdId(99),
        error: ttb_core::domain::ClientError::ServerBanned,
        message: "banned".to_string(),
    });
    h.transport.inject(TransportEvent::ConnectionLost);
    h.wait_phase(Phase::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    let connects = h
        .transport
        .outbound()
        .iter()
        .filter(|o| matches!(o, Outbound::Connect { .. }))
        .count();
    assert_eq!(connects, 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn control_messages_toggle_and_persist() {
    let h = start(base_settings()).await;
    h.control
        .send(BotControl::Toggle(Feature::Broadcast))
        .await
        .unwrap();
    let mut rx = h.status.clone();
    rx.wait_for(|s| !s.toggles.allow_broadcast).await.unwrap();
    assert!(!h.store.snapshot().bot.allow_broadcast);

    h.control.send(BotControl::SetRetention(5)).await.unwrap();
    h.settle().await;
    assert_eq!(
        h.store.snapshot().bot.context_history_retention_minutes,
        5
    );

    h.control.send(BotControl::Stop).await.unwrap();
    assert_eq!(h.task.await.unwrap(), SessionExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn restart_command_ends_the_session() {
    let h = start(base_settings()).await;
    h.pm(BOSS, "rs");
    let exit = h.task.await.unwrap();
    assert_eq!(exit, SessionExit::Restart);
    assert!(h
        .transport
        .texts_to(to(BOSS))
        .contains(&"Acknowledged. Restarting bot...".to_string()));
}
