//! Forecast horizon definitions.
//!
//! A horizon is anchored at a lead time LT and averages the target variable
//! over an interval of length I whose placement depends on the sign:
//!
//! | Sign | Config text | Window at anchor t |
//! |------|-------------|--------------------|
//! | Backward | `"-10min"` | (t+LT−I, t+LT] |
//! | Forward | `"+10min"` | [t+LT, t+LT+I) |
//! | Plain | `"10min"` | [t+LT, t+LT+I] |

use super::duration::parse_duration;
use super::feature_def::station_column;
use crate::error::{Error, Result};
use crate::timeseries::{millis, EpochMillis};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Placement of the averaging interval relative to the lead-time point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonSign {
    /// Interval ends at the lead-time point: (t+LT−I, t+LT].
    Backward,
    /// Interval starts at the lead-time point, end excluded: [t+LT, t+LT+I).
    Forward,
    /// Interval starts at the lead-time point, both ends included.
    #[default]
    Plain,
}

impl HorizonSign {
    /// Split a signed interval string into its sign and magnitude.
    ///
    /// ```
    /// use chrono::TimeDelta;
    /// use solarnc_features::schema::HorizonSign;
    ///
    /// let (sign, i) = HorizonSign::parse_interval("-10min").unwrap();
    /// assert_eq!(sign, HorizonSign::Backward);
    /// assert_eq!(i, TimeDelta::minutes(10));
    /// ```
    pub fn parse_interval(text: &str) -> Result<(Self, TimeDelta)> {
        let text = text.trim();
        let (sign, rest) = match text.chars().next() {
            Some('-') => (HorizonSign::Backward, &text[1..]),
            Some('+') => (HorizonSign::Forward, &text[1..]),
            Some(c) if c.is_ascii_digit() => (HorizonSign::Plain, text),
            Some(c) => {
                return Err(Error::config(format!(
                    "unrecognized horizon sign '{c}' in interval '{text}'"
                )))
            }
            None => return Err(Error::config("empty horizon interval")),
        };
        Ok((sign, parse_duration(rest)?))
    }
}

/// Averaging window in epoch milliseconds with explicit bound inclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: EpochMillis,
    pub hi: EpochMillis,
    pub lo_closed: bool,
    pub hi_closed: bool,
}

impl Window {
    /// Whether `t` lies inside the window.
    #[inline]
    pub fn contains(&self, t: EpochMillis) -> bool {
        let above = if self.lo_closed { t >= self.lo } else { t > self.lo };
        let below = if self.hi_closed { t <= self.hi } else { t < self.hi };
        above && below
    }

    /// Whether the window lies within the data span `[first, last]` of a
    /// series sampled every `period` ms.
    ///
    /// An open bound may sit one period beyond the span, since no grid point
    /// could fall between it and the span edge.
    pub fn is_covered(&self, first: EpochMillis, last: EpochMillis, period: i64) -> bool {
        let lo_ok = if self.lo_closed {
            self.lo >= first
        } else {
            self.lo >= first - period
        };
        let hi_ok = if self.hi_closed {
            self.hi <= last
        } else {
            self.hi <= last + period
        };
        lo_ok && hi_ok
    }
}

/// One forecast horizon over a set of target stations.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonSpec {
    /// Target variable, e.g. `"GHI"` or `"K_ineichen"`.
    pub variable: String,
    /// Target station names.
    pub stations: Vec<String>,
    /// Lead time LT.
    pub lead: TimeDelta,
    /// Lead time as configured; used in target column names.
    pub lead_label: String,
    /// Interval magnitude I.
    pub interval: TimeDelta,
    /// Window placement.
    pub sign: HorizonSign,
    /// Keep means over windows that run past the available data.
    pub allow_partial_windows: bool,
}

impl HorizonSpec {
    /// Build a horizon from configuration text.
    ///
    /// # Errors
    ///
    /// Configuration error on unparseable durations, an unrecognized sign,
    /// a negative lead, a zero interval or an empty station list.
    pub fn parse(
        variable: &str,
        stations: Vec<String>,
        lead: &str,
        interval: &str,
        allow_partial_windows: bool,
    ) -> Result<Self> {
        let lead_label = lead.trim().to_string();
        let lead_td = parse_duration(&lead_label)?;
        let (sign, interval_td) = HorizonSign::parse_interval(interval)?;

        if variable.trim().is_empty() {
            return Err(Error::config("horizon variable must not be empty"));
        }
        if stations.is_empty() {
            return Err(Error::config(format!(
                "horizon '{variable} {lead_label}' has no target stations"
            )));
        }
        if millis(interval_td) <= 0 {
            return Err(Error::config(format!(
                "horizon '{variable} {lead_label}' interval must be positive"
            )));
        }

        Ok(Self {
            variable: variable.to_string(),
            stations,
            lead: lead_td,
            lead_label,
            interval: interval_td,
            sign,
            allow_partial_windows,
        })
    }

    /// Averaging window for the anchor timestamp `t`.
    pub fn window(&self, t: EpochMillis) -> Window {
        let at = t + millis(self.lead);
        let i = millis(self.interval);
        match self.sign {
            HorizonSign::Backward => Window {
                lo: at - i,
                hi: at,
                lo_closed: false,
                hi_closed: true,
            },
            HorizonSign::Forward => Window {
                lo: at,
                hi: at + i,
                lo_closed: true,
                hi_closed: false,
            },
            HorizonSign::Plain => Window {
                lo: at,
                hi: at + i,
                lo_closed: true,
                hi_closed: true,
            },
        }
    }

    /// Source column for a station: `"{variable} {station}"`.
    pub fn source_column(&self, station: &str) -> String {
        station_column(&self.variable, station)
    }

    /// Target column for a station: `"{variable} {station} {lead}"`.
    pub fn target_column(&self, station: &str) -> String {
        format!("{} {}", self.source_column(station), self.lead_label)
    }

    /// `(source column, target column)` for every target station.
    pub fn columns(&self) -> Vec<(String, String)> {
        self.stations
            .iter()
            .map(|s| (self.source_column(s), self.target_column(s)))
            .collect()
    }

    /// Human-readable interval, e.g. `"[t+60min,t+60min+30min)"`.
    pub fn describe(&self) -> String {
        let lead = &self.lead_label;
        let i = super::duration::format_duration(self.interval);
        match self.sign {
            HorizonSign::Backward => format!("(t+{lead}-{i},t+{lead}]"),
            HorizonSign::Forward => format!("[t+{lead},t+{lead}+{i})"),
            HorizonSign::Plain => format!("[t+{lead},t+{lead}+{i}]"),
        }
    }
}
