//! Mailwizard: compose and schedule emails from a Telegram chat.
//!
//! A chat walks through recipients, subject, body and an optional attachment,
//! then either sends immediately over SMTP or stores the email in SQLite for
//! a background worker to deliver at the chosen time.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod compose;
pub mod dispatch;
pub mod mail;
pub mod schedule;

pub mod telegram;
