/// Cross-platform notification and voice-announce support
/// Currently only implements macOS delivery

#[cfg(target_os = "macos")]
use std::process::Command;

/// Surface a user-visible alert when a task's target time expires
pub fn notify_time_up(task_name: &str) {
    #[cfg(target_os = "macos")]
    {
        let script = format!(
            r#"display notification "⏰ '{}' is done" with title "Tempo - Time's Up""#,
            task_name.replace('"', "\\\"")
        );

        let _ = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output();
    }

    #[cfg(not(target_os = "macos"))]
    {
        // No-op on other platforms
        let _ = task_name;
    }
}

/// Speak a short phrase out loud. Best effort: this side channel must never
/// block or fail the underlying state transition.
pub fn announce(text: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = Command::new("say").arg(text).spawn();
    }

    #[cfg(not(target_os = "macos"))]
    {
        // No-op on other platforms
        let _ = text;
    }
}
