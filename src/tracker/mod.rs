//! Job tracker: shop-floor job and process tracking back-end.
//!
//! ## Overview
//!
//! Every job is broken into seventeen ordered production processes (Cutting
//! through Dispatch). Each job carries one row per process, and each row
//! moves through its own small state machine: Pending, In Progress, then
//! Completed or Rejected, with rework sending a finished row back to
//! In Progress. Completing a row starts the next one.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ lifecycle::create_job() ...            │
//!                       │         │ engine::update_process_status()        │
//!                       │         v                                        │
//!                       │  journal.rs   (snapshot rollback, UndoLog)       │
//!                       │         │                                        │
//!                       │         │ workflow::apply() / advance()          │
//!                       │         v                                        │
//!                       │  store.rs     (RecordStore, StoreHandle)         │
//!                       │    ├─ MemoryStore                                │
//!                       │    └─ db.rs   (SqliteStore)                      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | Shared types: `Job`, `JobProcess`, `User`, statuses     |
//! | `catalog`   | The fixed ordered process list and QC-process set       |
//! | `workflow`  | Pure transition rules, rework accounting, auto-advance  |
//! | `ws`        | `WsMessage` enum + `broadcast_message()` helper         |
//!
//! ## Typical Request Flow (complete a process)
//!
//! 1. `POST /api/job-processes/status` → `api::update_process_status()`
//! 2. `engine::update_process_status()` resolves the job, user and process,
//!    then snapshots the job under `journal::guarded()`.
//! 3. `workflow::apply()` validates the transition and quantities and
//!    returns the new row. On completion `workflow::advance()` starts the
//!    next process if it is still Pending.
//! 4. Changed rows and the refreshed job status are written back. A failed
//!    write restores the snapshot.
//! 5. The handler records the snapshot in the `UndoLog`, broadcasts a
//!    `ProcessUpdated` event and echoes the request with its undo token.

pub mod api;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod journal;
pub mod lifecycle;
pub mod models;
pub mod server;
pub mod store;
pub mod workflow;
pub mod ws;
