//! 浏览器端适配：用 JS 回调实现 `Presenter`，并负责图片预加载。

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use tracing::warn;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::js_sys::{Function, Promise, Reflect};
use web_sys::HtmlImageElement;

use crate::config::StoryConfig;
use crate::error::SetupError;
use crate::game::{Card, GameSummary};
use crate::presenter::{Presenter, StoryEvent};
use crate::story::{Direction, TransitionPhase};

fn callback(callbacks: &JsValue, name: &'static str) -> Result<Function, SetupError> {
    Reflect::get(callbacks, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or(SetupError::MissingCallback { name })
}

/// 页面脚本提供的回调集合，缺一不可。
pub struct Callbacks {
    render_page: Function,
    render_deck: Function,
    render_card_face: Function,
    show_completion_dialog: Function,
    confirm_acceptance: Function,
    play_ending_sequence: Function,
    on_event: Function,
    notify_error: Function,
}

impl Callbacks {
    pub fn from_js(callbacks: &JsValue) -> Result<Self, SetupError> {
        Ok(Self {
            render_page: callback(callbacks, "renderPage")?,
            render_deck: callback(callbacks, "renderDeck")?,
            render_card_face: callback(callbacks, "renderCardFace")?,
            show_completion_dialog: callback(callbacks, "showCompletionDialog")?,
            confirm_acceptance: callback(callbacks, "confirmAcceptance")?,
            play_ending_sequence: callback(callbacks, "playEndingSequence")?,
            on_event: callback(callbacks, "onEvent")?,
            notify_error: callback(callbacks, "notifyError")?,
        })
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> JsValue {
    to_value(value).unwrap_or_else(|error| {
        warn!(%error, "failed to encode value for the page");
        JsValue::UNDEFINED
    })
}

fn log_call_failure(name: &str, result: Result<JsValue, JsValue>) -> Option<JsValue> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(callback = name, ?error, "page callback threw");
            None
        }
    }
}

/// 回调返回 Promise 时等待其完成；否则直接使用返回值。
async fn settle(value: JsValue) -> Option<JsValue> {
    match value.dyn_into::<Promise>() {
        Ok(promise) => match JsFuture::from(promise).await {
            Ok(resolved) => Some(resolved),
            Err(error) => {
                warn!(?error, "page callback promise rejected");
                None
            }
        },
        Err(value) => Some(value),
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

pub struct JsPresenter {
    callbacks: Callbacks,
    exit: Duration,
    enter: Duration,
}

impl JsPresenter {
    pub fn new(callbacks: Callbacks, config: &StoryConfig) -> Self {
        Self {
            callbacks,
            exit: config.exit_duration(),
            enter: config.enter_duration(),
        }
    }

    async fn ask(&self, name: &str, function: &Function, argument: JsValue) -> bool {
        let Some(value) = log_call_failure(name, function.call1(&JsValue::NULL, &argument)) else {
            return false;
        };
        settle(value)
            .await
            .and_then(|answer| answer.as_bool())
            .unwrap_or(false)
    }
}

#[async_trait(?Send)]
impl Presenter for JsPresenter {
    async fn render_page(&self, index: usize, direction: Direction, phase: TransitionPhase) {
        let result = self.callbacks.render_page.call3(
            &JsValue::NULL,
            &JsValue::from_f64(index as f64),
            &encode(&direction),
            &encode(&phase),
        );
        let Some(value) = log_call_failure("renderPage", result) else {
            return;
        };
        if value.is_instance_of::<Promise>() {
            settle(value).await;
            return;
        }
        let duration = match phase {
            TransitionPhase::Exit => self.exit,
            TransitionPhase::Enter => self.enter,
        };
        self.wait(duration).await;
    }

    fn render_deck(&self, cards: &[Card], revealed: bool) {
        let result = self.callbacks.render_deck.call2(
            &JsValue::NULL,
            &encode(cards),
            &JsValue::from_bool(revealed),
        );
        log_call_failure("renderDeck", result);
    }

    fn render_card_face(&self, card: &Card) {
        let result = self
            .callbacks
            .render_card_face
            .call1(&JsValue::NULL, &encode(card));
        log_call_failure("renderCardFace", result);
    }

    async fn show_completion_dialog(&self, summary: &GameSummary) -> bool {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct DialogPayload<'a> {
            #[serde(flatten)]
            summary: &'a GameSummary,
            elapsed_label: String,
        }

        let payload = encode(&DialogPayload {
            summary,
            elapsed_label: summary.elapsed_label(),
        });
        self.ask(
            "showCompletionDialog",
            &self.callbacks.show_completion_dialog,
            payload,
        )
        .await
    }

    async fn confirm_acceptance(&self) -> bool {
        self.ask(
            "confirmAcceptance",
            &self.callbacks.confirm_acceptance,
            JsValue::UNDEFINED,
        )
        .await
    }

    fn play_ending_sequence(&self) {
        let result = self.callbacks.play_ending_sequence.call0(&JsValue::NULL);
        log_call_failure("playEndingSequence", result);
    }

    fn emit(&self, event: &StoryEvent) {
        let result = self.callbacks.on_event.call1(&JsValue::NULL, &encode(event));
        log_call_failure("onEvent", result);
    }

    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            TimeoutFuture::new(millis(duration)).await;
        }
    }

    fn notify_error(&self, message: &str) {
        let result = self
            .callbacks
            .notify_error
            .call1(&JsValue::NULL, &JsValue::from_str(message));
        log_call_failure("notifyError", result);
    }
}

async fn preload_image(src: &str) -> Result<(), JsValue> {
    let image = HtmlImageElement::new()?;
    let loaded = Promise::new(&mut |resolve, reject| {
        image.set_onload(Some(&resolve));
        image.set_onerror(Some(&reject));
    });
    image.set_src(src);
    JsFuture::from(loaded).await?;
    Ok(())
}

/// 并行预加载图片；失败的图片只记录日志，不阻塞后续流程。返回成功数量。
pub async fn preload_images(sources: Vec<String>) -> usize {
    let results = join_all(sources.iter().map(|src| preload_image(src))).await;
    sources
        .iter()
        .zip(results)
        .filter(|(src, result)| match result {
            Ok(()) => true,
            Err(error) => {
                warn!(src = src.as_str(), ?error, "image failed to preload");
                false
            }
        })
        .count()
}
