//! Orchestrator scenarios driven by shell-script workers.

use super::*;
use crate::downloader::test_helpers::*;
use crate::error::Error;
use crate::types::{ChangeKind, Status};
use std::time::Duration;

mod browsers;
mod lifecycle;
mod queue_unit;
