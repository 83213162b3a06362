//! Server-side tasks.
//!
//! Every `Async.` call returns a [`Ref<Task>`]. Resolving it (polling
//! `status`, or watching `task` events) is left to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::api::host::Host;
use crate::call::{Action, Call};
use crate::enums::EnumValue;
use crate::handle::Ref;

crate::api_class! {
    /// A long-running asynchronous operation.
    Task => "task",
}

crate::wire_enum! {
    pub enum TaskStatus: "task_status_type" {
        Pending = "pending",
        Success = "success",
        Failure = "failure",
        Cancelling = "cancelling",
        Cancelled = "cancelled",
    }
}

impl TaskStatus {
    /// True once the task will not change any more.
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure | TaskStatus::Cancelled)
    }
}

crate::api_record! {
    pub struct TaskRecord for Task {
        uuid: String = "uuid",
        name_label: String = "name_label",
        name_description: String = "name_description",
        created: DateTime<Utc> = "created",
        finished: DateTime<Utc> = "finished",
        status: EnumValue<TaskStatus> = "status",
        resident_on: Ref<Host> = "resident_on",
        /// Between 0.0 and 1.0
        progress: f64 = "progress",
        /// Encoded result of the operation, empty until it succeeds
        result: String = "result",
        /// Fault description when the task failed
        error_info: Vec<String> = "error_info",
        other_config: BTreeMap<String, String> = "other_config",
        subtask_of: Ref<Task> = "subtask_of",
    }
}

impl Ref<Task> {
    pub fn get_status(&self) -> Call<EnumValue<TaskStatus>> {
        self.get_field("status")
    }

    pub fn get_progress(&self) -> Call<f64> {
        self.get_field("progress")
    }

    pub fn get_result(&self) -> Call<String> {
        self.get_field("result")
    }

    pub fn get_error_info(&self) -> Call<Vec<String>> {
        self.get_field("error_info")
    }

    pub fn cancel(&self) -> Action<()> {
        self.action("cancel")
    }

    pub fn destroy(&self) -> Call<()> {
        self.call("destroy")
    }
}
