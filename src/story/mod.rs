//! 页面导航状态机：顺序翻页、切换期间的防重入，以及按页面类型分派副作用。

pub mod controller;
pub mod countdown;
pub mod state;

pub use controller::NarrativeController;
pub use countdown::Countdown;
pub use state::{
    Direction,
    Navigation,
    NavigationState,
    NavigationView,
    Page,
    PageKind,
    TransitionPhase,
};
