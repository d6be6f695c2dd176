//! The commands that can be sent to the printer.

use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

use crate::sequence_id::SequenceId;

/// The commands that can be sent to the printer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// A print command.
    Print(Print),
    /// A pushing command.
    Pushing(Pushing),
}

impl Command {
    /// Get the sequence ID.
    pub fn sequence_id(&self) -> &SequenceId {
        match self {
            Command::Print(print) => print.sequence_id(),
            Command::Pushing(pushing) => pushing.sequence_id(),
        }
    }

    /// Return a command asking the printer to push its full status.
    pub fn push_all() -> Self {
        Command::Pushing(Pushing::Pushall(Pushall {
            sequence_id: SequenceId::new(),
        }))
    }

    /// Return a command to pause the current print.
    pub fn pause() -> Self {
        Command::Print(Print::Pause(Pause {
            sequence_id: SequenceId::new(),
        }))
    }

    /// Return a command to resume the current print.
    pub fn resume() -> Self {
        Command::Print(Print::Resume(Resume {
            sequence_id: SequenceId::new(),
        }))
    }

    /// Return a command to stop the current print.
    pub fn stop() -> Self {
        Command::Print(Print::Stop(Stop {
            sequence_id: SequenceId::new(),
        }))
    }

    /// Return a command that has the printer fetch a job from `url` and
    /// start it.
    pub fn print_from_url(url: &url::Url) -> Self {
        let file_name = url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("job.gcode")
            .to_owned();

        Command::Print(Print::ProjectFile(ProjectFile {
            sequence_id: SequenceId::new(),
            param: if file_name.ends_with(".3mf") {
                "Metadata/plate_1.gcode".to_owned()
            } else {
                file_name.clone()
            },
            url: url.to_string(),
            subtask_name: file_name,
            project_id: "0".to_owned(),
            profile_id: "0".to_owned(),
            task_id: "0".to_owned(),
            subtask_id: "0".to_owned(),
            md5: String::new(),
            timelapse: false,
            bed_type: BedType::Auto,
            bed_levelling: true,
            flow_cali: false,
            vibration_cali: false,
            layer_inspect: false,
            use_ams: false,
        }))
    }
}

/// A print command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Print {
    /// Pause the current print.
    Pause(Pause),
    /// Resume the current print.
    Resume(Resume),
    /// Stop the current print.
    Stop(Stop),
    /// Start a print from a project or gcode file.
    ProjectFile(ProjectFile),
}

impl Print {
    /// Get the sequence ID.
    pub fn sequence_id(&self) -> &SequenceId {
        match self {
            Print::Pause(Pause { sequence_id }) => sequence_id,
            Print::Resume(Resume { sequence_id }) => sequence_id,
            Print::Stop(Stop { sequence_id }) => sequence_id,
            Print::ProjectFile(ProjectFile { sequence_id, .. }) => sequence_id,
        }
    }
}

/// A pushing command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Pushing {
    /// Get all device information.
    Pushall(Pushall),
}

impl Pushing {
    /// Get the sequence ID.
    pub fn sequence_id(&self) -> &SequenceId {
        match self {
            Pushing::Pushall(Pushall { sequence_id }) => sequence_id,
        }
    }
}

/// The payload for pausing the current print.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pause {
    /// The sequence ID.
    pub sequence_id: SequenceId,
}

/// The payload for resuming the current print.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resume {
    /// The sequence ID.
    pub sequence_id: SequenceId,
}

/// The payload for stopping the current print.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stop {
    /// The sequence ID.
    pub sequence_id: SequenceId,
}

/// The payload for getting all device information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pushall {
    /// The sequence ID.
    pub sequence_id: SequenceId,
}

/// The payload for starting a print. The printer downloads `url` itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectFile {
    /// The sequence ID.
    pub sequence_id: SequenceId,
    /// Path of the gcode to run, relative to the project archive for 3mf
    /// files.
    pub param: String,
    /// Where the printer fetches the job from.
    pub url: String,
    /// Display name of the job on the printer.
    pub subtask_name: String,
    /// Cloud project id; "0" on LAN.
    pub project_id: String,
    /// Cloud profile id; "0" on LAN.
    pub profile_id: String,
    /// Cloud task id; "0" on LAN.
    pub task_id: String,
    /// Cloud subtask id; "0" on LAN.
    pub subtask_id: String,
    /// Optional md5 of the file, empty to skip the check.
    pub md5: String,
    /// Record a timelapse.
    pub timelapse: bool,
    /// Build plate type.
    pub bed_type: BedType,
    /// Run bed levelling before printing.
    pub bed_levelling: bool,
    /// Run flow calibration before printing.
    pub flow_cali: bool,
    /// Run vibration calibration before printing.
    pub vibration_cali: bool,
    /// Enable first layer inspection.
    pub layer_inspect: bool,
    /// Feed filament from the AMS.
    pub use_ams: bool,
}

/// The build plate in use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, FromStr, PartialEq, Eq)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BedType {
    /// Let the printer detect the plate.
    Auto,
    /// Cool plate.
    CoolPlate,
    /// Engineering plate.
    EngPlate,
    /// High temperature plate.
    HotPlate,
    /// Textured PEI plate.
    TexturedPlate,
}
