//! Scriptable commands — one variant per public scheduler operation.
//!
//! A transport built on top of the scheduler decodes its requests into
//! `Command`s and reports the resulting `ReturnCode`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use taskgrid_state::{NodeId, TaskId};

use crate::return_code::ReturnCode;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Init,
    RegisterNode { node_id: NodeId },
    UnregisterNode { node_id: NodeId },
    AddTask { task_id: TaskId, consumption: u32 },
    DeleteTask { task_id: TaskId },
    ScheduleTask { threshold: i64 },
    QueryTaskStatus,
}

impl Scheduler {
    /// Run one command and map its result onto the return-code table.
    ///
    /// Query results are not carried by the code; read them with
    /// [`Scheduler::query_task_status`].
    pub fn execute(&mut self, command: &Command) -> ReturnCode {
        let code = match *command {
            Command::Init => {
                self.init();
                ReturnCode::Initialized
            }
            Command::RegisterNode { node_id } => self
                .register_node(node_id)
                .map_or_else(|e| (&e).into(), |()| ReturnCode::NodeRegistered),
            Command::UnregisterNode { node_id } => self
                .unregister_node(node_id)
                .map_or_else(|e| (&e).into(), |_| ReturnCode::NodeUnregistered),
            Command::AddTask {
                task_id,
                consumption,
            } => self
                .add_task(task_id, consumption)
                .map_or_else(|e| (&e).into(), |()| ReturnCode::TaskAdded),
            Command::DeleteTask { task_id } => self
                .delete_task(task_id)
                .map_or_else(|e| (&e).into(), |_| ReturnCode::TaskDeleted),
            Command::ScheduleTask { threshold } => self
                .schedule_task(threshold)
                .map_or_else(|e| (&e).into(), ReturnCode::from),
            Command::QueryTaskStatus => ReturnCode::QuerySucceeded,
        };
        debug!(?command, code = code.code(), "command executed");
        code
    }
}
