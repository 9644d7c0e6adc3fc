//! Daily activity submission.
//!
//! Builds the day's record, wraps it in the band-data batch the remote
//! service expects and posts it with the session's app token. The
//! acknowledgement is handed back verbatim.

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;

use crate::endpoints::Endpoints;
use crate::error::SubmitError;
use crate::session::SessionBundle;
use crate::timestamp::TimestampSource;
use crate::transport::{read_json, HttpClient};

/// Minute-of-day window covering the whole day.
pub const DAY_START_MINUTE: u32 = 0;
pub const DAY_END_MINUTE: u32 = 1439;

const DATA_SOURCE: u32 = 24;
const MINUTE_TZ: u32 = 32;
const SUMMARY_VERSION: u32 = 6;
const STEP_GOAL: u32 = 8000;
const SUMMARY_TZ: &str = "28800";

/// One day of synthetic activity for one account.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyActivityRecord {
    pub date: NaiveDate,
    pub step_total: u32,
    pub distance: f64,
    pub calories: f64,
    pub active_minutes: f64,
    pub device_id: String,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl DailyActivityRecord {
    pub fn new(date: NaiveDate, step_total: u32, device_id: &str) -> Self {
        let steps = f64::from(step_total);
        Self {
            date,
            step_total,
            distance: steps * 0.6,
            calories: steps * 0.04,
            active_minutes: steps / 1000.0,
            device_id: device_id.to_string(),
            start_minute: DAY_START_MINUTE,
            end_minute: DAY_END_MINUTE,
        }
    }

    /// The `data_json` form field: a one-element batch whose summary also
    /// carries a zero-length sleep block at `sync_secs`.
    pub fn to_data_json(&self, sync_secs: i64) -> Result<String, serde_json::Error> {
        let summary = Summary {
            v: SUMMARY_VERSION,
            slp: SleepBlock {
                st: sync_secs,
                ed: sync_secs,
                dp: 0,
            },
            stp: StepBlock {
                ttl: self.step_total,
                dis: self.distance,
                cal: self.calories,
                wk: self.active_minutes,
            },
            goal: STEP_GOAL,
            tz: SUMMARY_TZ,
        };
        let date = self.date.format("%Y-%m-%d").to_string();
        let entry = BandData {
            data_hr: "",
            date: &date,
            data: [MinuteRange {
                start: self.start_minute,
                stop: self.end_minute,
                value: self.step_total,
                tz: MINUTE_TZ,
                did: &self.device_id,
                src: DATA_SOURCE,
            }],
            summary: serde_json::to_string(&summary)?,
            source: DATA_SOURCE,
            kind: 0,
        };
        serde_json::to_string(&[entry])
    }
}

#[derive(Serialize)]
struct BandData<'a> {
    data_hr: &'a str,
    date: &'a str,
    data: [MinuteRange<'a>; 1],
    summary: String,
    source: u32,
    #[serde(rename = "type")]
    kind: u32,
}

#[derive(Serialize)]
struct MinuteRange<'a> {
    start: u32,
    stop: u32,
    value: u32,
    tz: u32,
    did: &'a str,
    src: u32,
}

#[derive(Serialize)]
struct Summary {
    v: u32,
    slp: SleepBlock,
    stp: StepBlock,
    goal: u32,
    tz: &'static str,
}

#[derive(Serialize)]
struct SleepBlock {
    st: i64,
    ed: i64,
    dp: u32,
}

#[derive(Serialize)]
struct StepBlock {
    ttl: u32,
    dis: f64,
    cal: f64,
    wk: f64,
}

/// What a successful submission produced.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub date: NaiveDate,
    pub steps: u32,
    pub ack: serde_json::Value,
}

pub struct Submitter<'a> {
    client: &'a HttpClient,
    endpoints: &'a Endpoints,
    timestamps: &'a TimestampSource,
}

impl<'a> Submitter<'a> {
    pub fn new(
        client: &'a HttpClient,
        endpoints: &'a Endpoints,
        timestamps: &'a TimestampSource,
    ) -> Self {
        Self {
            client,
            endpoints,
            timestamps,
        }
    }

    /// Post today's record for the session's user.
    ///
    /// # Errors
    /// `SubmitError::Http` on transport failure or a non-2xx status after
    /// retries, `Encode` if the payload cannot be serialized, `MalformedAck`
    /// when the reply is not JSON.
    pub async fn submit(
        &self,
        session: &SessionBundle,
        device_id: &str,
        step_total: u32,
    ) -> Result<SubmitReceipt, SubmitError> {
        let timestamp = self.timestamps.get_timestamp(self.client).await;
        let sync_millis = timestamp
            .parse::<i64>()
            .unwrap_or_else(|_| Utc::now().timestamp_millis());
        let sync_secs = sync_millis / 1000;
        let date = Local::now().date_naive();

        let record = DailyActivityRecord::new(date, step_total, device_id);
        let data_json = record.to_data_json(sync_secs)?;

        let url = self.endpoints.band_data_url(&timestamp);
        let sync = sync_secs.to_string();
        let form = [
            ("userid", session.user_id.as_str()),
            ("last_sync_data_time", sync.as_str()),
            ("device_type", "0"),
            ("last_deviceid", device_id),
            ("data_json", data_json.as_str()),
        ];

        tracing::debug!(user_id = %session.user_id, steps = step_total, %date, "submitting activity");
        let resp = self
            .client
            .send_checked(|c| {
                c.post(&url)
                    .header("apptoken", &session.app_token)
                    .form(&form)
            })
            .await?;

        let (ack, _) = read_json(resp)
            .await
            .map_err(|e| SubmitError::MalformedAck(e.to_string()))?;

        tracing::debug!(user_id = %session.user_id, ack = %ack, "submission acknowledged");
        Ok(SubmitReceipt {
            date,
            steps: step_total,
            ack,
        })
    }
}
