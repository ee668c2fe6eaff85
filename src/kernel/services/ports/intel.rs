//! Code-intelligence layer contract (editor models, extra declarations, compiler options).

use crate::kernel::compiler_options::CompilerOptions;
use lsp_types::Url;

pub trait CodeIntel: Send + Sync {
    fn has_model(&self, uri: &Url) -> bool;

    fn create_model(&self, contents: &str, uri: &Url);

    /// Shows the model for `uri` in the editor widget.
    fn set_active_model(&self, uri: &Url);

    fn add_extra_lib(&self, source: &str, uri: &Url);

    fn set_compiler_options(&self, options: &CompilerOptions);
}
