pub mod config;
pub mod error;
pub mod game;
pub mod presenter;
pub mod story;
pub mod web;

#[cfg(test)]
mod testing;

use std::rc::Rc;

use chrono::{Local, NaiveDateTime};
use gloo_timers::callback::Interval;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use tracing::error;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use config::StoryConfig;
pub use error::{ConfigError, SetupError};
pub use game::{
    Card, CardFace, FaceState, FlipOutcome, GameState, GameSummary, GameTiming, IntegrityError,
    MatchingGameEngine, PairId, Position,
};
pub use presenter::{Presenter, StoryEvent};
pub use story::{
    Countdown, Direction, NarrativeController, Navigation, NavigationState, NavigationView, Page,
    PageKind, TransitionPhase,
};

use web::{Callbacks, JsPresenter};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(JsValue::from)
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn load_config(config_json: Option<&str>) -> Result<StoryConfig, ConfigError> {
    match config_json {
        Some(json) => StoryConfig::from_json(json),
        None => {
            let config = StoryConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// 初始化失败：写日志并通过阻塞式提示告知用户，返回给调用方的错误文本。
fn report_setup_error(presenter: &dyn Presenter, error: &SetupError) -> String {
    let message = error.to_string();
    error!(%error, "greeting card setup failed");
    presenter.notify_error(&message);
    message
}

/// 页面持有的唯一入口：显式构造、显式持有，不依赖全局单例。
#[wasm_bindgen]
pub struct GreetingCard {
    controller: Rc<NarrativeController>,
    _ticker: Interval,
}

#[wasm_bindgen]
impl GreetingCard {
    #[wasm_bindgen(constructor)]
    pub fn new(callbacks: JsValue, config_json: Option<String>) -> Result<GreetingCard, JsValue> {
        let callbacks = Callbacks::from_js(&callbacks).map_err(|error| {
            error!(%error, "greeting card setup failed");
            serde_to_js_error(error)
        })?;

        let config = match load_config(config_json.as_deref()) {
            Ok(config) => config,
            Err(error) => {
                let presenter = JsPresenter::new(callbacks, &StoryConfig::default());
                let message = report_setup_error(&presenter, &SetupError::from(error));
                return Err(JsValue::from_str(&message));
            }
        };

        let presenter: Rc<dyn Presenter> = Rc::new(JsPresenter::new(callbacks, &config));
        let tick_ms = config.tick_ms;
        let controller = NarrativeController::new(config, presenter.clone()).map_err(|error| {
            JsValue::from_str(&report_setup_error(presenter.as_ref(), &error.into()))
        })?;
        let controller = Rc::new(controller);

        let ticking = Rc::downgrade(&controller);
        let ticker = Interval::new(tick_ms, move || {
            if let Some(controller) = ticking.upgrade() {
                controller.tick(local_now());
            }
        });

        Ok(GreetingCard {
            controller,
            _ticker: ticker,
        })
    }

    /// 合上封面，显示第一页。
    pub fn start(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move { Ok(JsValue::from_bool(controller.start_story().await)) })
    }

    pub fn next(&self) -> Promise {
        self.navigate(Direction::Next)
    }

    pub fn prev(&self) -> Promise {
        self.navigate(Direction::Prev)
    }

    #[wasm_bindgen(js_name = "goToPage")]
    pub fn go_to_page(&self, index: usize) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move { to_js(&controller.go_to_index(index).await) })
    }

    /// 方向键翻页；其他按键返回 `null`。
    #[wasm_bindgen(js_name = "handleKey")]
    pub fn handle_key(&self, key: String) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            match controller.handle_key(&key).await {
                Some(navigation) => to_js(&navigation),
                None => Ok(JsValue::NULL),
            }
        })
    }

    #[wasm_bindgen(js_name = "flipCard")]
    pub fn flip_card(&self, position: usize) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move { to_js(&controller.flip_card(position).await) })
    }

    #[wasm_bindgen(js_name = "resetGame")]
    pub fn reset_game(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            controller.reset_game().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn accept(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move { Ok(JsValue::from_bool(controller.accept().await)) })
    }

    /// 返回 "不" 按钮下一句台词；冷却期内返回 `undefined`。
    pub fn decline(&self) -> Option<String> {
        self.controller.decline(local_now())
    }

    /// 当前倒计时；未配置目标时刻时为 `null`。
    #[wasm_bindgen(js_name = "countdownJson")]
    pub fn countdown_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.controller.countdown(local_now())).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "navigationJson")]
    pub fn navigation_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.controller.snapshot()).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "gameJson")]
    pub fn game_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.controller.game().snapshot()).map_err(serde_to_js_error)
    }

    /// 预加载图片，返回成功加载的数量；失败不会让 Promise 拒绝。
    #[wasm_bindgen(js_name = "preloadImages")]
    pub fn preload_images(sources: Vec<String>) -> Promise {
        future_to_promise(async move {
            let loaded = web::preload_images(sources).await;
            Ok(JsValue::from_f64(loaded as f64))
        })
    }
}

impl GreetingCard {
    fn navigate(&self, direction: Direction) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move { to_js(&controller.go_to(direction).await) })
    }
}

/// 返回默认配置，方便页面脚本在此基础上修改。
#[wasm_bindgen(js_name = "defaultConfig")]
pub fn default_config() -> Result<String, JsValue> {
    serde_json::to_string(&StoryConfig::default()).map_err(serde_to_js_error)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
