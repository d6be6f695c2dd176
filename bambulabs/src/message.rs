//! Messages the printer publishes on its report topic.

use std::collections::BTreeMap;

use parse_display::{Display, FromStr};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sequence_id::SequenceId;

/// A message from the printer.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    /// A print message.
    Print(Print),
    /// An info message.
    Info(Info),
    /// Valid JSON we have no typed shape for.
    Json(Value),
    /// The message could not be parsed. The `Option<String>` contains the raw message.
    /// If the event was not a publish at all, the `Option` will be `None`.
    Unknown(Option<String>),
}

impl Message {
    /// Returns the sequence id of the message.
    pub fn sequence_id(&self) -> Option<SequenceId> {
        match self {
            Message::Print(print) => Some(print.sequence_id()),
            Message::Info(info) => Some(info.sequence_id()),
            Message::Json(_) | Message::Unknown(_) => None,
        }
    }
}

/// Outcome field on command acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display, FromStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[display(style = "SNAKE_CASE")]
pub enum Outcome {
    /// Success.
    #[serde(alias = "success")]
    Success,
    /// Fail.
    #[serde(alias = "fail")]
    Fail,
}

/// A print-channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Print {
    /// The status of the printer.
    PushStatus(PushStatus),
    /// Acknowledgement of a project file.
    ProjectFile(Ack),
    /// Acknowledgement of a pause.
    Pause(Ack),
    /// Acknowledgement of a resume.
    Resume(Ack),
    /// Acknowledgement of a stop.
    Stop(Ack),
}

impl Print {
    /// Returns the sequence id of the message.
    pub fn sequence_id(&self) -> SequenceId {
        match self {
            Print::PushStatus(status) => status.sequence_id.clone(),
            Print::ProjectFile(ack) | Print::Pause(ack) | Print::Resume(ack) | Print::Stop(ack) => {
                ack.sequence_id.clone()
            }
        }
    }

    /// Whether this is a command acknowledgement the printer rejected.
    pub fn is_rejected(&self) -> bool {
        match self {
            Print::PushStatus(_) => false,
            Print::ProjectFile(ack) | Print::Pause(ack) | Print::Resume(ack) | Print::Stop(ack) => {
                ack.result == Some(Outcome::Fail)
            }
        }
    }
}

/// Acknowledgement of a print command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Ack {
    /// The sequence id.
    pub sequence_id: SequenceId,
    /// The result of the command, when reported.
    pub result: Option<Outcome>,
    /// Free-form reason, usually set on failure.
    pub reason: Option<String>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// A push status message. Printers send a full report after `pushall` and
/// partial ones afterwards; unknown fields are kept in `other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PushStatus {
    /// The sequence id.
    pub sequence_id: SequenceId,
    /// The nozzle temperature.
    pub nozzle_temper: Option<f64>,
    /// The target nozzle temperature.
    pub nozzle_target_temper: Option<f64>,
    /// The bed temperature.
    pub bed_temper: Option<f64>,
    /// The target bed temperature.
    pub bed_target_temper: Option<f64>,
    /// The chamber temperature.
    pub chamber_temper: Option<f64>,
    /// The percentage of the print completed.
    pub mc_percent: Option<i64>,
    /// The remaining time of the print, in minutes.
    pub mc_remaining_time: Option<i64>,
    /// The print error code, 0 when healthy.
    pub print_error: Option<i64>,
    /// The wifi signal.
    pub wifi_signal: Option<String>,
    /// The gcode state, e.g. `IDLE`, `RUNNING`, `PAUSE`, `FINISH`.
    pub gcode_state: Option<String>,
    /// The subtask name.
    pub subtask_name: Option<String>,
    /// The gcode file.
    pub gcode_file: Option<String>,
    /// The current layer.
    pub layer_num: Option<i64>,
    /// The total layer count.
    pub total_layer_num: Option<i64>,
    /// Camera settings.
    pub ipcam: Option<Ipcam>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl PushStatus {
    /// Fold a partial report into this one; fields absent from `update`
    /// keep their previous value.
    pub fn merge(&mut self, update: PushStatus) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if update.$field.is_some() {
                    self.$field = update.$field;
                })*
            };
        }

        take!(
            nozzle_temper,
            nozzle_target_temper,
            bed_temper,
            bed_target_temper,
            chamber_temper,
            mc_percent,
            mc_remaining_time,
            print_error,
            wifi_signal,
            gcode_state,
            subtask_name,
            gcode_file,
            layer_num,
            total_layer_num,
            ipcam
        );
        self.sequence_id = update.sequence_id;
        self.other.extend(update.other);
    }
}

/// Camera settings reported by the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Ipcam {
    /// Whether the camera is recording.
    pub ipcam_record: Option<String>,
    /// Timelapse setting.
    pub timelapse: Option<String>,
    /// The RTSP url, for printers that stream over RTSPS.
    pub rtsp_url: Option<String>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// An info-channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Info {
    /// The firmware versions of the printer modules.
    GetVersion(GetVersion),
}

impl Info {
    /// Returns the sequence id of the message.
    pub fn sequence_id(&self) -> SequenceId {
        match self {
            Info::GetVersion(get_version) => get_version.sequence_id.clone(),
        }
    }
}

/// A get version response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GetVersion {
    /// The sequence id.
    pub sequence_id: SequenceId,
    /// The modules.
    pub module: Vec<InfoModule>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// A module of the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InfoModule {
    /// The module name.
    pub name: String,
    /// The software version.
    pub sw_ver: String,
    /// The hardware version.
    pub hw_ver: String,
    /// The serial number.
    pub sn: String,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_deserialize_message_json() {
        let message = r#"{ "hello": "world" }"#;

        let result = serde_json::from_str::<Message>(message);

        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_message_print() {
        let message = format!(
            r#"{{ "print": {{ "bed_temper": 17.40625, "wifi_signal": "-59dBm", "command": "push_status", "msg": 1, "sequence_id": {} }}}}"#,
            2
        );

        let result = serde_json::from_str::<Message>(&message).unwrap();

        let Message::Print(Print::PushStatus(status)) = result else {
            panic!("expected a push_status message");
        };
        assert_eq!(status.bed_temper, Some(17.40625));
        assert_eq!(status.wifi_signal.as_deref(), Some("-59dBm"));
    }

    #[test]
    fn test_deserialize_message_info() {
        let message = format!(
            r#"{{
                "info":{{
                    "command":"get_version",
                    "sequence_id":{},
                    "module":[
                        {{
                            "name":"ota",
                            "project_name":"C11",
                            "sw_ver":"01.04.02.00",
                            "hw_ver":"OTA",
                            "sn":"01S00C123400001"
                        }}
                    ],
                    "result":"SUCCESS",
                    "reason":""
                }}
            }}"#,
            2
        );

        let result = serde_json::from_str::<Message>(&message);

        assert!(result.is_ok());
        assert!(matches!(result.unwrap(), Message::Info(_)));
    }

    #[test]
    fn test_deserialize_rejected_project_file() {
        let message = r#"{"print":{"command":"project_file","sequence_id":"7","result":"fail","reason":"file not found"}}"#;

        let Message::Print(print) = serde_json::from_str::<Message>(message).unwrap() else {
            panic!("expected a print message");
        };
        assert!(print.is_rejected());
        assert_eq!(print.sequence_id(), SequenceId::String("7".to_owned()));
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut full: PushStatus = serde_json::from_str(
            r#"{"sequence_id":1,"gcode_state":"RUNNING","mc_percent":10,"bed_temper":60.0}"#,
        )
        .unwrap();
        let partial: PushStatus = serde_json::from_str(r#"{"sequence_id":2,"mc_percent":11}"#).unwrap();

        full.merge(partial);

        assert_eq!(full.mc_percent, Some(11));
        assert_eq!(full.gcode_state.as_deref(), Some("RUNNING"));
        assert_eq!(full.bed_temper, Some(60.0));
        assert_eq!(full.sequence_id, SequenceId::Integer(2));
    }
}
