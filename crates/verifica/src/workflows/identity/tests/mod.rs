mod common;

mod credential;
mod gateway;
