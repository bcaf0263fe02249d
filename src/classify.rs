// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Categories that signups and issues are counted under.

use crate::aggregate::Category;
use chrono::NaiveDate;

/// Client platform a user signed up from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Ios,
    Android,
    WebElectron,
    Unknown,
}

impl Platform {
    /// Classify a user agent string. A missing or empty agent is `Unknown`.
    ///
    /// `iphone` is checked before `android`, so an agent mentioning both is
    /// `Ios`.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
            return Platform::Unknown;
        };
        let ua = ua.to_lowercase();
        if ua.contains("iphone") {
            Platform::Ios
        } else if ua.contains("android") {
            Platform::Android
        } else {
            Platform::WebElectron
        }
    }

    /// Value stored in the `platform` column.
    pub fn label(self) -> &'static str {
        match self {
            Platform::Ios => "IOS",
            Platform::Android => "ANDROID",
            Platform::WebElectron => "WEB/ELECTRON",
            // Existing dashboards filter on this spelling.
            Platform::Unknown => "None",
        }
    }
}

impl Category for Platform {
    fn all() -> Vec<Self> {
        vec![
            Platform::Ios,
            Platform::Android,
            Platform::WebElectron,
            Platform::Unknown,
        ]
    }
}

/// Issue priority taken from a `p1`..`p5` label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    None,
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl Priority {
    const LEVELS: [Priority; 5] = [
        Priority::P1,
        Priority::P2,
        Priority::P3,
        Priority::P4,
        Priority::P5,
    ];

    /// Parse a single label, returning `None` if it is not a priority label.
    pub fn from_label(label: &str) -> Option<Self> {
        let level = label.trim().strip_prefix(['p', 'P'])?;
        match level {
            "1" => Some(Priority::P1),
            "2" => Some(Priority::P2),
            "3" => Some(Priority::P3),
            "4" => Some(Priority::P4),
            "5" => Some(Priority::P5),
            _ => None,
        }
    }

    /// The most urgent priority among `labels`, or `Priority::None` if no
    /// label carries one.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        labels
            .into_iter()
            .filter_map(Self::from_label)
            .min()
            .unwrap_or(Priority::None)
    }

    /// Value stored in the nullable `priority` column.
    pub fn level(self) -> Option<i64> {
        match self {
            Priority::None => None,
            Priority::P1 => Some(1),
            Priority::P2 => Some(2),
            Priority::P3 => Some(3),
            Priority::P4 => Some(4),
            Priority::P5 => Some(5),
        }
    }
}

impl Category for Priority {
    fn all() -> Vec<Self> {
        let mut all = vec![Priority::None];
        all.extend(Self::LEVELS);
        all
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn label(self) -> &'static str {
        match self {
            IssueState::Open => "OPEN",
            IssueState::Closed => "CLOSED",
        }
    }
}

/// Priority and state of an issue churn event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChurnKey {
    pub priority: Priority,
    pub state: IssueState,
}

impl Category for ChurnKey {
    fn all() -> Vec<Self> {
        Priority::all()
            .into_iter()
            .flat_map(|priority| {
                [IssueState::Open, IssueState::Closed]
                    .map(|state| ChurnKey { priority, state })
            })
            .collect()
    }
}

/// Churn events for one issue: always an open event on the day it was
/// created, and a close event on the day it was closed, if it was.
pub fn churn_events(
    created: NaiveDate,
    closed: Option<NaiveDate>,
    priority: Priority,
) -> Vec<(NaiveDate, ChurnKey)> {
    let mut events = vec![(
        created,
        ChurnKey {
            priority,
            state: IssueState::Open,
        },
    )];
    if let Some(closed) = closed {
        events.push((
            closed,
            ChurnKey {
                priority,
                state: IssueState::Closed,
            },
        ));
    }
    events
}
