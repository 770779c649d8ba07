//! # Tollgrid Booth
//!
//! Toll-booth orchestrator for the tollgrid highway toll network.
//!
//! One orchestrator instance runs per tollbooth and drives each vehicle's
//! crossing as an asynchronous saga over the bus:
//!
//! ```text
//! UI commands ──► TollBooth ──► CAMERA_REQUEST ──► plate recognizer
//!                    ▲                                   │
//!                    └───────── CAMERA_RESPONSE ◄────────┘
//!                    │
//!                    ├──► TOLLPRICE_REQUEST ──► pricing/ledger
//!                    ▲                               │
//!                    └──── TOLLPRICE_RESPONSE ◄──────┘
//!                    │
//!                    └──► ENTRY_ACCEPTED / EXIT_COMPLETED events,
//!                         state updates for observers
//! ```
//!
//! No round trip is awaited in place: requests are fire-and-published and
//! responses return through their correlation ids on later invocations.

pub mod camera;
pub mod config;
pub mod orchestrator;

pub use camera::CameraLookup;
pub use config::BoothConfig;
pub use orchestrator::TollBooth;
