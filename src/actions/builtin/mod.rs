pub mod apps;
pub mod fs;
pub mod wallpaper;

pub use apps::{AppAliases, CloseApplication, OpenApplication};
pub use fs::{
    CopyFile, CreateFolder, DeleteFile, ListDirectory, MoveFile, OpenFile, OpenFolder, SearchFile,
};
pub use wallpaper::ChangeWallpaper;

use super::registry::RegistryBuilder;
use super::{ActionDescriptor, ParamKind, ParamSpec, SideEffect};

const PATH: &[ParamSpec] = &[ParamSpec {
    name: "path",
    kind: ParamKind::Path,
}];

const SOURCE_DESTINATION: &[ParamSpec] = &[
    ParamSpec {
        name: "source",
        kind: ParamKind::Path,
    },
    ParamSpec {
        name: "destination",
        kind: ParamKind::Path,
    },
];

const SEARCH: &[ParamSpec] = &[
    ParamSpec {
        name: "path",
        kind: ParamKind::Path,
    },
    ParamSpec {
        name: "pattern",
        kind: ParamKind::OptionalString,
    },
];

const APPLICATION: &[ParamSpec] = &[ParamSpec {
    name: "name",
    kind: ParamKind::String,
}];

/// Every action the assistant knows. Fixed at compile time.
pub static CATALOGUE: &[ActionDescriptor] = &[
    ActionDescriptor {
        name: "open_folder",
        description: "Open a folder in the file manager",
        side_effect: SideEffect::Read,
        parameters: PATH,
    },
    ActionDescriptor {
        name: "open_file",
        description: "Open a file with its default application",
        side_effect: SideEffect::Read,
        parameters: PATH,
    },
    ActionDescriptor {
        name: "list_directory",
        description: "List the contents of a directory",
        side_effect: SideEffect::Read,
        parameters: PATH,
    },
    ActionDescriptor {
        name: "search_file",
        description: "Search a directory tree for file names matching a glob pattern (default *)",
        side_effect: SideEffect::Read,
        parameters: SEARCH,
    },
    ActionDescriptor {
        name: "open_application",
        description: "Launch an application by name (e.g. notepad, calc, chrome)",
        side_effect: SideEffect::Mutate,
        parameters: APPLICATION,
    },
    ActionDescriptor {
        name: "close_application",
        description: "Close a running application by name",
        side_effect: SideEffect::Mutate,
        parameters: APPLICATION,
    },
    ActionDescriptor {
        name: "create_folder",
        description: "Create a folder, including missing parents",
        side_effect: SideEffect::Mutate,
        parameters: PATH,
    },
    ActionDescriptor {
        name: "copy_file",
        description: "Copy a file or folder from source to destination",
        side_effect: SideEffect::Mutate,
        parameters: SOURCE_DESTINATION,
    },
    ActionDescriptor {
        name: "change_wallpaper",
        description: "Set an image file as the desktop wallpaper",
        side_effect: SideEffect::Mutate,
        parameters: PATH,
    },
    ActionDescriptor {
        name: "delete_file",
        description: "Delete a file or folder (always asks for confirmation)",
        side_effect: SideEffect::Destructive,
        parameters: PATH,
    },
    ActionDescriptor {
        name: "move_file",
        description: "Move a file or folder from source to destination (always asks for confirmation)",
        side_effect: SideEffect::Destructive,
        parameters: SOURCE_DESTINATION,
    },
];

/// Binds one handler to every builtin catalogue entry.
pub fn bind_all(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .bind("open_folder", OpenFolder)
        .bind("open_file", OpenFile)
        .bind("list_directory", ListDirectory)
        .bind("search_file", SearchFile)
        .bind("open_application", OpenApplication)
        .bind("close_application", CloseApplication)
        .bind("create_folder", CreateFolder)
        .bind("copy_file", CopyFile)
        .bind("change_wallpaper", ChangeWallpaper)
        .bind("delete_file", DeleteFile)
        .bind("move_file", MoveFile)
}
