//! Bridge between an IQtec/Kobra building controller and a Homie 5 home automation setup.

pub mod commands;
pub mod config;
pub mod connection;
pub mod controller;
pub mod coordinator;
pub mod dispatch;
pub mod entity;
pub mod homie;
pub mod mapping;
pub mod output;
