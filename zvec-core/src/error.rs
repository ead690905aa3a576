// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for zvec

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZvecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("store is full: all {max_count} slots are occupied")]
    DbFull { max_count: usize },

    #[error("corrupt identifier index: {0}")]
    CorruptIndex(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("store disabled after an I/O fault; reopen to recover")]
    Faulted,
}

pub type Result<T> = std::result::Result<T, ZvecError>;
