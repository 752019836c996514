//! Redis 队列后端模块
//! Redis queue backend module

mod redis_queue;

pub use redis_queue::RedisQueue;
