//! # Tollgrid Camera
//!
//! Plate-recognition responder for the tollgrid highway toll network.
//!
//! A stateless request/response simulator: every valid `CAMERA_REQUEST` on
//! a booth's `camera/requests` topic yields one `CAMERA_RESPONSE` on the
//! requesting lane's `responses` topic, carrying a synthetic plate and a
//! confidence score and echoing the correlation id. Used as the test double
//! for the real roadside camera in simulations and integration tests.

pub mod recognizer;

pub use recognizer::PlateRecognizer;
