// src/bridge/interpreter.rs

use std::{path::Path, process::Command};

use crate::errors::ConfigError;

/// An external program that runs a script file.
///
/// The scratch file path is always appended as the final argument, after
/// `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    /// Executable name or path.
    pub program: String,
    /// Flags placed before the script path.
    pub args: Vec<String>,
    /// Extension given to scratch files, without the dot.
    pub extension: String,
    /// Flag that keeps a console window open after the script ends, if the
    /// interpreter has one.
    pub keep_open_arg: Option<String>,
}

impl Interpreter {
    /// Windows PowerShell. Skips the user profile, bypasses execution policy
    /// for the scratch file and never prompts.
    pub fn powershell() -> Self {
        Self::powershell_flavour("powershell.exe")
    }

    /// PowerShell 7+, with the same flags as [`Interpreter::powershell`].
    pub fn pwsh() -> Self {
        Self::powershell_flavour("pwsh")
    }

    /// POSIX `sh`.
    pub fn posix_shell() -> Self {
        Self {
            program: "sh".to_string(),
            args: Vec::new(),
            extension: "sh".to_string(),
            keep_open_arg: None,
        }
    }

    fn powershell_flavour(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extension: "ps1".to_string(),
            keep_open_arg: Some("-NoExit".to_string()),
        }
    }

    /// Windows PowerShell on Windows, PowerShell 7 everywhere else.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::powershell()
        } else {
            Self::pwsh()
        }
    }

    /// Resolves a short interpreter name as used in configuration.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "powershell" | "powershell.exe" => Ok(Self::powershell()),
            "pwsh" | "pwsh.exe" => Ok(Self::pwsh()),
            "sh" => Ok(Self::posix_shell()),
            _ => Err(ConfigError::UnknownInterpreter(name.to_string())),
        }
    }

    /// Builds the command that runs `script`. Stdio is left to the caller.
    pub fn command(&self, script: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(script);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            use windows::Win32::System::Threading::CREATE_NO_WINDOW;

            command.creation_flags(CREATE_NO_WINDOW.0);
        }

        command
    }

    /// Builds the command that runs `script` in a console window of its own.
    ///
    /// On Windows this goes through `cmd /C start`, which returns as soon as
    /// the window is up. Elsewhere the interpreter is started directly.
    pub fn window_command(&self, script: &Path, keep_open: bool) -> Command {
        let mut args: Vec<&str> = Vec::new();
        if keep_open {
            args.extend(self.keep_open_arg.as_deref());
        }
        // The window is for a person to watch and type into.
        args.extend(
            self.args
                .iter()
                .map(String::as_str)
                .filter(|arg| *arg != "-NonInteractive"),
        );

        #[cfg(windows)]
        let command = {
            let mut command = Command::new("cmd");
            // The empty argument is the window title `start` expects first.
            command
                .args(["/C", "start", ""])
                .arg(&self.program)
                .args(&args)
                .arg(script);
            command
        };

        #[cfg(not(windows))]
        let command = {
            let mut command = Command::new(&self.program);
            command.args(&args).arg(script);
            command
        };

        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powershell_flags_end_with_file() {
        let ps = Interpreter::powershell();
        assert_eq!(ps.program, "powershell.exe");
        assert_eq!(ps.args.last().map(String::as_str), Some("-File"));
        assert!(ps.args.iter().any(|a| a == "-NoProfile"));
        assert!(ps.args.windows(2).any(|w| w[0] == "-ExecutionPolicy" && w[1] == "Bypass"));
        assert_eq!(ps.extension, "ps1");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Interpreter::from_name("SH").unwrap(), Interpreter::posix_shell());
        assert_eq!(Interpreter::from_name("pwsh").unwrap(), Interpreter::pwsh());
        assert!(Interpreter::from_name("cmd").is_err());
    }

    #[test]
    fn test_command_appends_script_path_last() {
        let command = Interpreter::pwsh().command(Path::new("/tmp/job.ps1"));
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args.last().map(String::as_str), Some("/tmp/job.ps1"));
        assert_eq!(args[args.len() - 2], "-File");
    }

    #[test]
    fn test_window_command_keeps_powershell_open() {
        let command = Interpreter::powershell().window_command(Path::new("job.ps1"), true);
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        let no_exit = args.iter().position(|a| a == "-NoExit").unwrap();
        let file = args.iter().position(|a| a == "-File").unwrap();
        assert!(no_exit < file);
        assert_eq!(args.last().map(String::as_str), Some("job.ps1"));
        assert!(!args.iter().any(|a| a == "-NonInteractive"));

        let closing = Interpreter::powershell().window_command(Path::new("job.ps1"), false);
        assert!(!closing.get_args().any(|a| a == "-NoExit"));
    }

    #[cfg(unix)]
    #[test]
    fn test_window_command_ignores_keep_open_without_flag() {
        let command = Interpreter::posix_shell().window_command(Path::new("/tmp/job.sh"), true);
        assert_eq!(command.get_program(), "sh");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["/tmp/job.sh"]);
    }
}
