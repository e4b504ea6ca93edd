#![allow(dead_code)]

pub mod env;
pub mod fakes;
pub mod http;
