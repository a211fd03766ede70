use bytes::Bytes;

use crate::command::{self, Command};

/// Accumulates commands issued inside a pipeline block.
///
/// The accumulator mimics the client's command surface but only records;
/// after the block returns, the router sends the recorded list as one batch
/// to the single node owning the batch's slot.
///
/// # Example
///
/// ```no_run
/// # async fn example(client: slotwise::ClusterClient) -> slotwise::Result<()> {
/// let replies = client
///     .pipelined(|pipe| {
///         pipe.set("{user1000}.name", "ada");
///         pipe.set("{user1000}.lang", "rust");
///     })
///     .await?;
/// assert_eq!(replies.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records an arbitrary command.
    pub fn call(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Records a GET.
    pub fn get(&mut self, key: impl Into<Bytes>) -> &mut Self {
        self.call(command::get(key))
    }

    /// Records a SET.
    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> &mut Self {
        self.call(command::set(key, value))
    }

    /// Records a DEL.
    pub fn del(&mut self, key: impl Into<Bytes>) -> &mut Self {
        self.call(command::del(key))
    }

    /// Returns the number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true when no commands were recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
