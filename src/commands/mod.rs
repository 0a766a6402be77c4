pub mod config;
pub mod stack;
pub mod state;

use anyhow::Result;

use crate::Context;
use crate::config::Stack;
use crate::paths;
use crate::state::FileStateStore;

/// Load the selected stack and its state store
pub fn load_stack(ctx: &Context) -> Result<(Stack, FileStateStore)> {
    let stack = Stack::load(ctx.stack.as_deref())?;
    let store = FileStateStore::new(paths::state_file(&stack.name)?);
    Ok((stack, store))
}
