// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// One pass through the per-retry segment of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attempt {
    index: u32,
    is_last: bool,
}

impl Attempt {
    /// Creates an attempt with the given 0-based index.
    ///
    /// # Examples
    ///
    /// ```
    /// use http_pipeline::retry::Attempt;
    ///
    /// let attempt = Attempt::new(0, false);
    /// assert!(attempt.is_first());
    /// ```
    #[must_use]
    pub fn new(index: u32, is_last: bool) -> Self {
        Self { index, is_last }
    }

    /// Returns the first attempt of a call that allows `max_attempts` attempts in total.
    pub(crate) fn first(max_attempts: u32) -> Self {
        Self::new(0, max_attempts <= 1)
    }

    /// Returns `true` for the original send.
    #[must_use]
    pub fn is_first(self) -> bool {
        self.index == 0
    }

    /// Returns `true` if no further attempt is allowed after this one.
    #[must_use]
    pub fn is_last(self) -> bool {
        self.is_last
    }

    /// Returns the 0-based index. This equals the resend count of the attempt.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    #[cfg_attr(test, mutants::skip)] // causes test timeouts
    pub(crate) fn increment(self, max_attempts: u32) -> Option<Self> {
        let next = self.index.saturating_add(1);
        if next >= max_attempts {
            return None;
        }

        Some(Self::new(next, next == max_attempts.saturating_sub(1)))
    }
}

impl Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.index.fmt(f)
    }
}
