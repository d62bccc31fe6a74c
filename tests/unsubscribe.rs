mod common;

use common::{raw_message, MockTransport, ScriptedLauncher, ScriptedPage, StalledTransport};
use std::sync::Arc;
use std::time::Duration;
use unsubscribe_engine::browser::{BrowserError, ElementTarget, SessionPool};
use unsubscribe_engine::constants::ONE_CLICK_BODY;
use unsubscribe_engine::transport::{HttpMethod, TransportError};
use unsubscribe_engine::{
    categorize, normalize_message, Category, Config, Difficulty, FailureReason, Method,
    SuccessMethod, UnsubscribeClient, UnsubscribeMethod,
};

const BUTTON_PAGE: &str = r#"<html><body>
    <h1>We're sorry to see you go</h1>
    <button>Cancel</button>
    <button>Unsubscribe</button>
</body></html>"#;

const DONE_PAGE: &str = "<html><body><p>You have been unsubscribed.</p></body></html>";

fn client(transport: MockTransport) -> (UnsubscribeClient, Arc<MockTransport>) {
    client_with(transport, Config::immediate())
}

fn client_with(transport: MockTransport, config: Config) -> (UnsubscribeClient, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let client = UnsubscribeClient::builder()
        .config(config)
        .transport(transport.clone())
        .build()
        .unwrap();
    (client, transport)
}

fn browser_client(transport: MockTransport, launcher: &ScriptedLauncher) -> UnsubscribeClient {
    browser_client_with(transport, launcher, Config::immediate())
}

fn browser_client_with(
    transport: MockTransport,
    launcher: &ScriptedLauncher,
    config: Config,
) -> UnsubscribeClient {
    UnsubscribeClient::builder()
        .config(config)
        .transport(Arc::new(transport))
        .browser_pool(SessionPool::new(Arc::new(launcher.clone())))
        .build()
        .unwrap()
}

#[tokio::test]
async fn header_link_end_to_end() {
    let link = "https://news.example.com/u?id=42";
    let message = raw_message(
        "m1",
        "\"Example News\" <News@Example.com>",
        Some(&format!("<mailto:leave@example.com>, <{link}>")),
        "<p>Weekly digest</p>",
    );
    let candidate = normalize_message(&message).unwrap();
    assert_eq!(candidate.unsubscribe_method, UnsubscribeMethod::Header);
    assert_eq!(candidate.unsubscribe_link.as_deref(), Some(link));
    assert_eq!(candidate.sender_email, "news@example.com");
    assert_eq!(categorize(&candidate), Difficulty::Easy);

    let (client, transport) = client(MockTransport::new().reply(link, 200, DONE_PAGE));
    let outcome = client.unsubscribe_candidate(&candidate).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.method(), Method::Header);
    assert_eq!(outcome.category(), Category::AutoSuccess);
    assert_eq!(outcome.unsubscribe_url.as_deref(), Some(link));
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(transport.sent()[0].method, HttpMethod::Get);
}

#[tokio::test]
async fn body_link_behind_login_wall() {
    let link = "https://medium.com/me/settings/unsubscribe?u=9";
    let message = raw_message(
        "m2",
        "Medium Daily Digest <noreply@medium.com>",
        None,
        &format!(r#"<p>Stories for you</p><a href="{link}">Unsubscribe</a>"#),
    );
    let candidate = normalize_message(&message).unwrap();
    assert_eq!(candidate.unsubscribe_method, UnsubscribeMethod::Body);
    assert_eq!(categorize(&candidate), Difficulty::Hard);

    let launcher = ScriptedLauncher::new(vec![]);
    let client = browser_client(
        MockTransport::new().reply(link, 200, "<p>Please sign in to manage your emails</p>"),
        &launcher,
    );
    let outcome = client.unsubscribe_candidate(&candidate).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::LoginRequired));
    assert_eq!(outcome.category(), Category::ManualRequired);
    assert_eq!(outcome.unsubscribe_url.as_deref(), Some(link));
    // login walls are not retried in a browser
    assert_eq!(launcher.log.launches(), 0);
}

#[tokio::test]
async fn expired_link_is_not_requested() {
    let (client, transport) = client(MockTransport::new());
    let outcome = client
        .unsubscribe(Some("https://news.example.com/u?exp=1"))
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Failed));
    assert_eq!(outcome.error_details.as_deref(), Some("expired"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn future_expiry_is_attempted() {
    let link = "https://news.example.com/u?exp=9999999999";
    let (client, transport) = client(MockTransport::new().reply(link, 200, DONE_PAGE));
    let outcome = client.unsubscribe(Some(link)).await;

    assert!(outcome.is_success());
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn mailto_needs_manual_email() {
    let (client, transport) = client(MockTransport::new());
    let outcome = client
        .unsubscribe(Some("mailto:leave@list.example.com?subject=unsubscribe"))
        .await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::ManualActionNeeded));
    assert!(outcome.message.contains("leave@list.example.com"));
    assert_eq!(outcome.category(), Category::ManualRequired);
    assert!(transport.sent().is_empty());

    let invalid = client.unsubscribe(Some("mailto:?subject=x")).await;
    assert_eq!(invalid.failure_reason(), Some(FailureReason::Failed));
}

#[tokio::test]
async fn missing_or_unsupported_links_fail() {
    let (client, transport) = client(MockTransport::new());

    let none = client.unsubscribe(None).await;
    assert_eq!(none.failure_reason(), Some(FailureReason::Failed));
    assert_eq!(none.unsubscribe_url, None);

    let blank = client.unsubscribe(Some("   ")).await;
    assert_eq!(blank.failure_reason(), Some(FailureReason::Failed));

    let ftp = client.unsubscribe(Some("ftp://files.example.com/u")).await;
    assert_eq!(ftp.failure_reason(), Some(FailureReason::Failed));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn one_click_links_are_posted() {
    let link = "https://esp.example.com/unsub?List-Unsubscribe=One-Click&t=abc";
    let (client, transport) = client(MockTransport::new().reply(link, 200, ""));
    let outcome = client.unsubscribe(Some(link)).await;

    assert!(outcome.is_success());
    assert!(outcome.message.contains("confirmation unclear"));
    let sent = transport.sent();
    assert_eq!(sent[0].method, HttpMethod::Post);
    assert_eq!(sent[0].form_body.as_deref(), Some(ONE_CLICK_BODY));
}

#[tokio::test]
async fn confirmation_mail_needs_manual_action() {
    let link = "https://news.example.com/u";
    let (client, _) = client(MockTransport::new().reply(
        link,
        200,
        "<p>We sent you a confirmation email.</p>",
    ));
    let outcome = client.unsubscribe(Some(link)).await;
    assert_eq!(outcome.failure_reason(), Some(FailureReason::ManualActionNeeded));
}

#[tokio::test]
async fn unclear_response_respects_completion_policy() {
    let link = "https://news.example.com/u";
    let (optimistic, _) = client(MockTransport::new().reply(link, 200, "<p>Thanks</p>"));
    let outcome = optimistic.unsubscribe(Some(link)).await;
    assert_eq!(outcome.method(), Method::Header);

    let strict_config = Config {
        optimistic_completion: false,
        ..Config::immediate()
    };
    let (strict, _) = client_with(
        MockTransport::new().reply(link, 200, "<p>Thanks</p>"),
        strict_config,
    );
    let outcome = strict.unsubscribe(Some(link)).await;
    assert_eq!(outcome.failure_reason(), Some(FailureReason::ManualActionNeeded));
}

#[tokio::test]
async fn transport_failures_without_browser() {
    let slow = "https://slow.example.com/u";
    let limited = "https://busy.example.com/u";
    let broken = "https://broken.example.com/u";
    let (client, _) = client(
        MockTransport::new()
            .error(slow, TransportError::Timeout)
            .reply(limited, 429, "")
            .reply(broken, 500, "oops"),
    );

    let timed_out = client.unsubscribe(Some(slow)).await;
    assert_eq!(timed_out.failure_reason(), Some(FailureReason::Timeout));
    assert_eq!(timed_out.category(), Category::Failed);

    let rate_limited = client.unsubscribe(Some(limited)).await;
    assert_eq!(rate_limited.failure_reason(), Some(FailureReason::Failed));
    assert!(rate_limited
        .error_details
        .as_deref()
        .unwrap()
        .contains("rate limited"));

    let server_error = client.unsubscribe(Some(broken)).await;
    assert_eq!(server_error.failure_reason(), Some(FailureReason::Failed));
    assert!(server_error.message.contains("500"));
}

#[tokio::test]
async fn rate_limited_request_escalates_to_browser() {
    let link = "https://busy.example.com/u";
    let launcher = ScriptedLauncher::new(vec![(
        link,
        ScriptedPage::html(BUTTON_PAGE).then(DONE_PAGE),
    )]);
    let client = browser_client(MockTransport::new().reply(link, 503, ""), &launcher);

    let outcome = client.unsubscribe(Some(link)).await;

    assert_eq!(outcome.resolution, unsubscribe_engine::Resolution::Success(SuccessMethod::Browser));
    assert_eq!(outcome.method(), Method::Browser);
    assert_eq!(launcher.log.clicks(), vec![ElementTarget::new("button", 1)]);
    assert_eq!(launcher.log.launches(), 1);
    assert_eq!(launcher.log.closes(), 1);
}

#[tokio::test]
async fn browser_obstacles_are_reported() {
    let captcha = "https://a.example.com/u";
    let login = "https://b.example.com/u";
    let prefs = "https://c.example.com/u";
    let empty = "https://d.example.com/u";
    let launcher = ScriptedLauncher::new(vec![
        (
            captcha,
            ScriptedPage::html(
                r#"<iframe src="https://www.google.com/recaptcha/api2/anchor"></iframe>
                   <button>Unsubscribe</button>"#,
            ),
        ),
        (
            login,
            ScriptedPage::html("<form><input type=\"text\"></form>")
                .at("https://b.example.com/account/login?next=/u"),
        ),
        (
            prefs,
            ScriptedPage::html(
                r#"<h1>Email preferences</h1>
                   <input type="checkbox"><input type="checkbox">
                   <input type="checkbox"><input type="checkbox">
                   <button>Unsubscribe</button>"#,
            ),
        ),
        (empty, ScriptedPage::html("<p>Nothing to click here</p>")),
    ]);
    let transport = MockTransport::new()
        .reply(captcha, 500, "")
        .reply(login, 500, "")
        .reply(prefs, 500, "")
        .reply(empty, 500, "");
    let client = browser_client(transport, &launcher);

    let out = client.unsubscribe(Some(captcha)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::Captcha));
    assert_eq!(out.category(), Category::ManualRequired);

    let out = client.unsubscribe(Some(login)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::LoginRequired));

    let out = client.unsubscribe(Some(prefs)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::ManualActionNeeded));

    let out = client.unsubscribe(Some(empty)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::ManualActionNeeded));
    assert!(out.message.contains("No unsubscribe button"));

    assert!(launcher.log.clicks().is_empty());
    assert_eq!(launcher.log.launches(), 4);
    assert_eq!(launcher.log.closes(), 4);
}

#[tokio::test]
async fn checkbox_is_ticked_before_confirming() {
    let link = "https://e.example.com/u";
    let launcher = ScriptedLauncher::new(vec![(
        link,
        ScriptedPage::html(
            r#"<form>
                 <label><input type="checkbox" name="all"> Unsubscribe from all lists</label>
                 <button type="submit">Confirm</button>
               </form>"#,
        )
        .then("<p>Your settings were saved.</p>"),
    )]);
    let client = browser_client(MockTransport::new().error(link, TransportError::Network("reset".into())), &launcher);

    let outcome = client.unsubscribe(Some(link)).await;

    assert_eq!(outcome.method(), Method::Browser);
    assert!(outcome.message.contains("confirmation unclear"));
    assert_eq!(
        launcher.log.clicks(),
        vec![ElementTarget::new("input", 0), ElementTarget::new("button", 0)]
    );
}

#[tokio::test]
async fn empty_email_field_stops_before_clicking() {
    let link = "https://f.example.com/u";
    let launcher = ScriptedLauncher::new(vec![(
        link,
        ScriptedPage::html(
            r#"<form>
                 <input type="email" name="email" placeholder="you@example.com">
                 <input type="submit" value="Unsubscribe">
               </form>"#,
        ),
    )]);
    let client = browser_client(MockTransport::new().reply(link, 404, ""), &launcher);

    let outcome = client.unsubscribe(Some(link)).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::ManualActionNeeded));
    assert!(launcher.log.clicks().is_empty());
    assert_eq!(launcher.log.closes(), 1);
}

#[tokio::test]
async fn browser_faults_release_the_session() {
    let slow = "https://slow.example.com/u";
    let gone = "https://gone.example.com/u";
    let launcher = ScriptedLauncher::new(vec![
        (slow, ScriptedPage::failing(BrowserError::Timeout)),
        (
            gone,
            ScriptedPage::failing(BrowserError::Internal("target crashed".into())),
        ),
    ]);
    let transport = MockTransport::new().reply(slow, 503, "").reply(gone, 503, "");
    let client = browser_client(transport, &launcher);

    let out = client.unsubscribe(Some(slow)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::Timeout));

    let out = client.unsubscribe(Some(gone)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::Failed));
    assert!(out.error_details.as_deref().unwrap().contains("target crashed"));

    assert_eq!(launcher.log.closes(), 2);
}

#[tokio::test]
async fn browser_that_cannot_start_fails_the_attempt() {
    let link = "https://g.example.com/u";
    let client = browser_client(
        MockTransport::new().reply(link, 503, ""),
        &ScriptedLauncher::broken(),
    );

    let outcome = client.unsubscribe(Some(link)).await;
    assert_eq!(outcome.failure_reason(), Some(FailureReason::Failed));
    assert_eq!(outcome.message, "Browser automation failed to start");
}

#[tokio::test]
async fn panicking_browser_still_closes_the_session() {
    let crashing = "https://h.example.com/u";
    let healthy = "https://i.example.com/u";
    let launcher = ScriptedLauncher::new(vec![
        (crashing, ScriptedPage::panicking()),
        (healthy, ScriptedPage::html(BUTTON_PAGE).then(DONE_PAGE)),
    ]);
    let transport = MockTransport::new()
        .reply(crashing, 503, "")
        .reply(healthy, 503, "");
    let client = browser_client(transport, &launcher);

    let out = client.unsubscribe(Some(crashing)).await;
    assert_eq!(out.failure_reason(), Some(FailureReason::Failed));
    assert_eq!(out.message, "Browser automation error");
    assert!(out.error_details.as_deref().unwrap().contains("renderer crashed"));
    assert_eq!(launcher.log.closes(), 1);

    // the single pool slot is free again
    let out = client.unsubscribe(Some(healthy)).await;
    assert_eq!(out.method(), Method::Browser);
    assert_eq!(launcher.log.launches(), 2);
    assert_eq!(launcher.log.closes(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_request_times_out() {
    let client = UnsubscribeClient::builder()
        .config(Config::immediate())
        .transport(Arc::new(StalledTransport))
        .build()
        .unwrap();

    let outcome = client.unsubscribe(Some("https://stuck.example.com/u")).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Timeout));
    assert_eq!(outcome.message, "Request timed out");
}

#[tokio::test(start_paused = true)]
async fn stalled_page_load_times_out() {
    let link = "https://stuck.example.com/u";
    let launcher = ScriptedLauncher::new(vec![(link, ScriptedPage::stalled())]);
    let client = browser_client(MockTransport::new().reply(link, 503, ""), &launcher);

    let outcome = client.unsubscribe(Some(link)).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::Timeout));
    assert_eq!(outcome.message, "Page load timed out");
    assert!(launcher.log.clicks().is_empty());
    assert_eq!(launcher.log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn control_rendered_late_is_found_by_polling() {
    let link = "https://j.example.com/u";
    let launcher = ScriptedLauncher::new(vec![(
        link,
        ScriptedPage::html(BUTTON_PAGE)
            .loading("<div class=\"spinner\">Loading...</div>")
            .then(DONE_PAGE),
    )]);
    let config = Config {
        element_search_timeout: Duration::from_secs(5),
        ..Config::immediate()
    };
    let client = browser_client_with(MockTransport::new().reply(link, 503, ""), &launcher, config);

    let outcome = client.unsubscribe(Some(link)).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.method(), Method::Browser);
    assert_eq!(launcher.log.clicks(), vec![ElementTarget::new("button", 1)]);
}

#[tokio::test(start_paused = true)]
async fn control_that_never_renders_gives_up_at_the_deadline() {
    let link = "https://k.example.com/u";
    let spinner = "<div class=\"spinner\">Loading...</div>";
    let launcher = ScriptedLauncher::new(vec![(link, ScriptedPage::html(spinner))]);
    let config = Config {
        element_search_timeout: Duration::from_secs(2),
        ..Config::immediate()
    };
    let client = browser_client_with(MockTransport::new().reply(link, 503, ""), &launcher, config);

    let started = tokio::time::Instant::now();
    let outcome = client.unsubscribe(Some(link)).await;

    assert_eq!(outcome.failure_reason(), Some(FailureReason::ManualActionNeeded));
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(launcher.log.clicks().is_empty());
}
