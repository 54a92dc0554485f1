//! 反思层：动作解析、参数解码、提示模板、反思循环与降级产物

pub mod action;
pub mod arguments;
pub mod fallback;
pub mod loop_;
pub mod parser;
pub mod prompts;

pub use action::{Action, ArtifactKind, ParsedAction};
pub use arguments::decode;
pub use fallback::{
    salvage_payload, tag_degraded, DegradedArtifactBuilder, DirectionFromHypothesis, ReviewFromSearchResults,
};
pub use loop_::{AttemptOutcome, AttemptReport, ExhaustReason, LoopSettings, ReflectionLoop, RoundRecord};
pub use parser::{extract_arguments, ResponseParser};
pub use prompts::TaskPrompts;
