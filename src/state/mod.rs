//! Client-side state
//!
//! A library surface for softphone front ends that embed the calling SDK and
//! link this crate. The server binary never calls into it, so only its tests
//! exercise it here.
#![allow(dead_code)]

pub mod softphone;
