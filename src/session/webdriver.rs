//! fantoccini-backed session factory and session.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::wd::{TimeoutConfiguration, WebDriverCompatibleCommand};
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};

use crate::config::EngineConfig;
use crate::error::{SessionError, StepError};
use crate::session::{BrowserSession, Locator, SessionFactory};

/// Builds Chrome sessions over a running chromedriver.
pub struct WebDriverFactory {
    webdriver_url: String,
    headless: bool,
    page_load_timeout: Duration,
    script_timeout: Duration,
}

impl WebDriverFactory {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            headless: config.headless,
            page_load_timeout: config.page_load_timeout,
            script_timeout: config.script_timeout,
        }
    }

    fn capabilities(&self, download_dir: &Path) -> Map<String, Value> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }

        let prefs = json!({
            "download.default_directory": download_dir.display().to_string(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "safebrowsing.enabled": true,
        });

        let mut caps = Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": args, "prefs": prefs }),
        );
        caps
    }

    async fn endpoint_reachable(&self) -> bool {
        let status_url = format!("{}/status", self.webdriver_url.trim_end_matches('/'));
        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn create(&self, download_dir: &Path) -> Result<Box<dyn BrowserSession>, SessionError> {
        if !self.endpoint_reachable().await {
            return Err(SessionError::Unreachable {
                url: self.webdriver_url.clone(),
            });
        }

        let client = ClientBuilder::native()
            .capabilities(self.capabilities(download_dir))
            .connect(&self.webdriver_url)
            .await?;

        client
            .update_timeouts(TimeoutConfiguration::new(
                Some(self.script_timeout),
                Some(self.page_load_timeout),
                None,
            ))
            .await?;

        if self.headless {
            // Headless Chrome blocks downloads until the session's download
            // directory is explicitly allowed over the DevTools channel.
            client
                .issue_cmd(ChromiumCommand {
                    cmd: "Page.setDownloadBehavior",
                    params: json!({
                        "behavior": "allow",
                        "downloadPath": download_dir.display().to_string(),
                    }),
                })
                .await?;
        }

        Ok(Box::new(WebDriverSession { client }))
    }
}

/// chromedriver's non-standard endpoint for Chrome DevTools commands.
#[derive(Debug)]
struct ChromiumCommand {
    cmd: &'static str,
    params: Value,
}

impl WebDriverCompatibleCommand for ChromiumCommand {
    fn endpoint(
        &self,
        base_url: &url::Url,
        session_id: Option<&str>,
    ) -> Result<url::Url, url::ParseError> {
        base_url.join(&format!(
            "session/{}/chromium/send_command",
            session_id.unwrap_or_default()
        ))
    }

    fn method_and_body(&self, _request_url: &url::Url) -> (http::Method, Option<String>) {
        let body = json!({ "cmd": self.cmd, "params": self.params }).to_string();
        (http::Method::POST, Some(body))
    }

    fn is_new_session(&self) -> bool {
        false
    }

    fn is_legacy(&self) -> bool {
        false
    }
}

/// One live WebDriver session.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    async fn find(&self, locator: &Locator) -> Result<Element, StepError> {
        self.client
            .find(locator.as_webdriver())
            .await
            .map_err(|err| {
                if err.is_no_such_element() {
                    StepError::ElementNotFound {
                        locator: locator.to_string(),
                    }
                } else {
                    err.into()
                }
            })
    }
}

fn click_error(err: CmdError, locator: &Locator) -> StepError {
    if err.to_string().contains("click intercepted") {
        StepError::ClickIntercepted {
            locator: locator.to_string(),
        }
    } else {
        err.into()
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), StepError> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, StepError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn is_displayed(&self, locator: &Locator) -> Result<bool, StepError> {
        match self.client.find(locator.as_webdriver()).await {
            Ok(element) => Ok(element.is_displayed().await?),
            Err(err) if err.is_no_such_element() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn is_clickable(&self, locator: &Locator) -> Result<bool, StepError> {
        match self.client.find(locator.as_webdriver()).await {
            Ok(element) => Ok(element.is_displayed().await? && element.is_enabled().await?),
            Err(err) if err.is_no_such_element() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn click(&self, locator: &Locator) -> Result<(), StepError> {
        let element = self.find(locator).await?;
        element.click().await.map_err(|err| click_error(err, locator))
    }

    async fn click_via_script(&self, locator: &Locator) -> Result<(), StepError> {
        let element = self.find(locator).await?;
        self.client
            .execute("arguments[0].click();", vec![serde_json::to_value(&element)?])
            .await?;
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<(), StepError> {
        let element = self.find(locator).await?;
        self.client
            .execute(
                "arguments[0].scrollIntoView({block: 'center'});",
                vec![serde_json::to_value(&element)?],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self, locator: &Locator) -> Result<(), StepError> {
        let element = self.find(locator).await?;
        element.clear().await?;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), StepError> {
        let element = self.find(locator).await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn element_text(&self, locator: &Locator) -> Result<String, StepError> {
        let element = self.find(locator).await?;
        Ok(element.text().await?)
    }

    async fn execute_script(&self, code: &str) -> Result<(), StepError> {
        self.client.execute(code, vec![]).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, StepError> {
        Ok(self.client.screenshot().await?)
    }

    async fn close(&self) -> Result<(), StepError> {
        self.client.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::path::PathBuf;

    fn factory(headless: bool) -> WebDriverFactory {
        WebDriverFactory::new(&EngineConfig {
            headless,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn capabilities_route_downloads_into_job_dir() {
        let caps = factory(false).capabilities(&PathBuf::from("/tmp/job-42"));
        let options = caps.get("goog:chromeOptions").unwrap();
        let prefs = options.get("prefs").unwrap();
        assert_eq!(
            prefs.get("download.default_directory").unwrap(),
            "/tmp/job-42"
        );
        assert_eq!(prefs.get("download.prompt_for_download").unwrap(), false);
    }

    #[test]
    fn headless_adds_headless_args() {
        let caps = factory(true).capabilities(&PathBuf::from("/tmp/job"));
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));

        let caps = factory(false).capabilities(&PathBuf::from("/tmp/job"));
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn chromium_command_targets_send_command_endpoint() {
        let cmd = ChromiumCommand {
            cmd: "Page.setDownloadBehavior",
            params: json!({"behavior": "allow"}),
        };
        let base = url::Url::parse("http://localhost:9515/").unwrap();
        let endpoint = cmd.endpoint(&base, Some("abc123")).unwrap();
        assert_eq!(
            endpoint.as_str(),
            "http://localhost:9515/session/abc123/chromium/send_command"
        );

        let (method, body) = cmd.method_and_body(&endpoint);
        assert_eq!(method, http::Method::POST);
        let body: Value = serde_json::from_str(&body.unwrap()).unwrap();
        assert_eq!(body["cmd"], "Page.setDownloadBehavior");
    }
}
