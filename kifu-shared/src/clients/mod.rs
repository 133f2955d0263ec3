pub mod http;
pub mod rabbitmq;
pub mod redis;
