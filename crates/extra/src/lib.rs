//! Extra features for Salvo web framework.
//!
//! This library provides some common web features.
//!
//! `salvo_extra` uses a set of [feature flags] to reduce the amount of compiled and
//! optional dependencies.
//!
//! # Feature flags
//!
//! | Feature | Description |
//! | --- | --- |
//! | [`affix-state`](affix_state) | Middleware for adding shared state to the request context |
//! | [`compression`] | Middleware for compressing response bodies |
//! | [`logging`] | Middleware for logging requests and responses |
//! | [`websocket`] | WebSocket implementation |
#![doc(html_favicon_url = "https://salvo.rs/favicon-32x32.png")]
#![doc(html_logo_url = "https://salvo.rs/images/logo.svg")]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod cfg;

cfg_feature! {
    #![feature = "affix-state"]
    pub mod affix_state;
}

cfg_feature! {
    #![feature = "compression"]
    pub mod compression;
}

cfg_feature! {
    #![feature = "logging"]
    pub mod logging;
}

cfg_feature! {
    #![feature = "websocket"]
    pub mod websocket;
}
