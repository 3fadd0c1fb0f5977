//! Installs a Python wheel archive directly into an OCI layer, without
//! ever materializing a real filesystem tree or invoking `pip`.

mod bytecode;
mod error;
mod hooks;
mod install;
mod record;
mod script;
mod staged;
mod wheel_file;

pub use bytecode::{BytecodeEnv, ExternalInterpreterCompiler};
pub use error::WheelError;
pub use hooks::{DirectUrlHook, DirectUrlSource, EntryPointScriptHook, InstallContext, InstalledPackagesHook, PostInstallHook};
pub use install::install_wheel;
pub use record::{encoded_sha256, read_record, write_record, RecordEntry};
pub use script::{scripts_from_entry_points, script_launcher, Script};
pub use staged::StagedFile;
pub use wheel_file::{parse_key_value, RootIsPurelib, WheelMetadata};
