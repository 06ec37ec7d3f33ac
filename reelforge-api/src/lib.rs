// reelforge API library
//
// HTTP surface for the transcoding and playback subsystem.

pub mod http;

pub use http::AppState;
