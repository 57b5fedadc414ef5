//! Character-device style boundary for the [`h2o`] engine.
//!
//! A [`DeviceRegistry`] hands out [`Device`]s by major number. Each device owns one engine.
//! Opening a device yields a [`File`], whose writes submit hydrogens and whose reads request
//! oxygens. Results can be turned into the negative-errno convention with [`errno`] and
//! [`to_ssize`]. [`UserBuf`] stands in for caller memory that may be partially unmapped.

#[macro_use]
extern crate tracing;

pub extern crate h2o;

mod errno;
mod file;
mod registry;
mod user_buf;

pub use crate::{
    errno::{errno, to_ssize, EFAULT, EINTR, ENOSPC},
    file::{AccessMode, File},
    registry::{Device, DeviceConfig, DeviceRegistry},
    user_buf::UserBuf,
};
