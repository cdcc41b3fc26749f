// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The builtin tool set.

mod bash;
mod edit_file;
mod glob;
mod grep;
mod list_dir;
mod lsp;
mod multiedit;
mod patch;
mod question;
mod read_file;
mod skill;
mod todo;
mod webfetch;
mod write_file;

pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_dir::ListDirTool;
pub use lsp::LspTool;
pub use multiedit::MultiEditTool;
pub use patch::PatchTool;
pub use question::QuestionTool;
pub use read_file::ReadFileTool;
pub use skill::SkillTool;
pub use todo::{TodoReadTool, TodoWriteTool};
pub use webfetch::WebFetchTool;
pub use write_file::WriteFileTool;

use crate::ToolRegistry;

/// Register every builtin tool.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(ListDirTool);
    registry.register(GlobTool);
    registry.register(GrepTool);
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(EditFileTool);
    registry.register(MultiEditTool);
    registry.register(PatchTool);
    registry.register(BashTool);
    registry.register(WebFetchTool);
    registry.register(TodoReadTool);
    registry.register(TodoWriteTool);
    registry.register(SkillTool);
    registry.register(QuestionTool);
    registry.register(LspTool);
}
