pub mod aspect;
pub mod media;
pub mod staging;
pub mod storage;
pub mod storage_key;
pub mod thumbnail_service;
pub mod video_service;
pub mod video_store;
