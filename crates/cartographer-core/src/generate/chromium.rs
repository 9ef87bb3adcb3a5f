//! Chrome DevTools Protocol driver (chromiumoxide)
//!
//! ## Requirements
//!
//! A Chrome or Chromium binary must be installed; chromiumoxide looks for it
//! in the usual locations and honours the `CHROME` environment variable.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use std::path::Path;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::generate::driver::{LaunchOptions, Launcher, PageDriver};

/// Intermediate mouse positions used when dragging
const DRAG_STEPS: u32 = 30;

fn cdp(e: CdpError) -> Error {
    Error::Browser(e.to_string())
}

/// Launches a local Chrome through chromiumoxide
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher;

impl Launcher for ChromiumLauncher {
    type Driver = ChromiumPage;

    async fn launch(&self, options: &LaunchOptions) -> Result<ChromiumPage> {
        let mut builder = BrowserConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::SessionStart)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::SessionStart(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let download_path = options.download_dir.to_string_lossy().to_string();
        let setup = async {
            let behavior = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(download_path)
                .build()
                .map_err(Error::SessionStart)?;
            browser
                .execute(behavior)
                .await
                .map_err(|e| Error::SessionStart(e.to_string()))?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| Error::SessionStart(e.to_string()))
        };

        let page = setup.await;
        match page {
            Ok(page) => Ok(ChromiumPage {
                browser: Some(browser),
                page,
                handler: handler_task,
            }),
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                Err(e)
            }
        }
    }
}

/// One tab of a chromiumoxide browser
pub struct ChromiumPage {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumPage {
    async fn all(&self, selector: &str) -> Result<Vec<Element>> {
        self.page.find_elements(selector).await.map_err(cdp)
    }

    async fn first(&self, selector: &str) -> Result<Element> {
        self.all(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64, pressed: bool) -> Result<()> {
        let mut event = DispatchMouseEventParams::new(kind, x, y);
        event.button = Some(MouseButton::Left);
        if pressed {
            event.buttons = Some(1);
            event.click_count = Some(1);
        }
        self.page.execute(event).await.map_err(cdp)?;
        Ok(())
    }
}

impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(cdp)?;
        self.page.wait_for_navigation().await.map_err(cdp)?;
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        Ok(self.all(selector).await?.len())
    }

    async fn texts(&mut self, selector: &str) -> Result<Vec<String>> {
        let mut texts = Vec::new();
        for element in self.all(selector).await? {
            if let Some(text) = element.inner_text().await.map_err(cdp)? {
                texts.push(text);
            }
        }
        Ok(texts)
    }

    async fn upload(&mut self, selector: &str, file: &Path) -> Result<()> {
        let input = self.first(selector).await?;
        let mut params = SetFileInputFilesParams::new(vec![file.to_string_lossy().to_string()]);
        params.backend_node_id = Some(input.backend_node_id.clone());
        self.page.execute(params).await.map_err(cdp)?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let input = self.first(selector).await?;
        let js = format!(
            "function() {{ this.focus(); this.value = {}; \
             this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             this.dispatchEvent(new Event('change', {{ bubbles: true }})); }}",
            serde_json::to_string(value)?
        );
        input.call_js_fn(js, false).await.map_err(cdp)?;
        Ok(())
    }

    async fn click(&mut self, selector: &str, text: Option<&str>) -> Result<()> {
        let elements = self.all(selector).await?;
        let wanted = text.map(str::to_lowercase);

        for element in elements {
            if let Some(ref wanted) = wanted {
                let label = element.inner_text().await.map_err(cdp)?.unwrap_or_default();
                if !label.to_lowercase().contains(wanted.as_str()) {
                    continue;
                }
            }
            element.click().await.map_err(cdp)?;
            return Ok(());
        }

        Err(Error::ElementNotFound {
            selector: match text {
                Some(text) => format!("{} with text '{}'", selector, text),
                None => selector.to_string(),
            },
        })
    }

    async fn select(&mut self, selector: &str, value: &str) -> Result<()> {
        let dropdown = self.first(selector).await?;
        let js = format!(
            "function() {{ this.value = {}; \
             this.dispatchEvent(new Event('change', {{ bubbles: true }})); }}",
            serde_json::to_string(value)?
        );
        dropdown.call_js_fn(js, false).await.map_err(cdp)?;
        Ok(())
    }

    async fn drag(&mut self, selector: &str, from: f64, to: f64) -> Result<()> {
        let handle = self.first(selector).await?;
        handle.scroll_into_view().await.map_err(cdp)?;
        let bounds = handle.bounding_box().await.map_err(cdp)?;

        let y = bounds.y + bounds.height * 0.5;
        let start_x = bounds.x + bounds.width * from;
        let end_x = bounds.x + bounds.width * to;

        self.mouse(DispatchMouseEventType::MouseMoved, start_x, y, false).await?;
        self.mouse(DispatchMouseEventType::MousePressed, start_x, y, true).await?;
        for step in 1..=DRAG_STEPS {
            let x = start_x + (end_x - start_x) * f64::from(step) / f64::from(DRAG_STEPS);
            self.mouse(DispatchMouseEventType::MouseMoved, x, y, true).await?;
        }
        self.mouse(DispatchMouseEventType::MouseReleased, end_x, y, true).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut browser) = self.browser.take() {
            let closed = browser.close().await.map_err(cdp);
            let _ = browser.wait().await;
            self.handler.abort();
            closed?;
        }
        Ok(())
    }
}
