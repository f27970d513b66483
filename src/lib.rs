//! dubber - mention-driven video dubbing bot
//!
//! Turns social media mentions like "dub this in Korean" into dubbed videos:
//! extract the language and source link, download the video, drive a dubbing
//! job on the vendor to completion, and reply with the result.

pub mod cli;
pub mod config;
pub mod dubbing;
pub mod error;
pub mod extract;
pub mod language;
pub mod logs;
pub mod media;
pub mod pipeline;
pub mod publisher;
pub mod retry;
pub mod server;
pub mod social;
pub mod source;
pub mod state;
