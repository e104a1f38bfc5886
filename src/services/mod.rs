pub mod live;
pub mod muxer;
pub mod narration;
pub mod poller;
pub mod retriever;
pub mod session;
pub mod simulation;
pub mod storage;
pub mod submitter;
