use anyhow::Context;
use tokio::process::Command;

/// Direct audio stream URL for a YouTube Music track via `yt-dlp`.
pub async fn resolve_audio_url(
    video_id: &str,
    cookies_from_browser: Option<&str>,
) -> anyhow::Result<String> {
    let mut cmd = Command::new("yt-dlp");
    cmd.args(["-f", "bestaudio", "--get-url", "--no-playlist", "--no-warnings"]);

    if let Some(browser) = cookies_from_browser {
        cmd.arg("--cookies-from-browser").arg(browser);
    }
    cmd.arg(format!("https://music.youtube.com/watch?v={video_id}"));

    let out = cmd.output().await.context("run yt-dlp")?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        anyhow::bail!("yt-dlp failed: {}", stderr.trim());
    }

    let stdout = String::from_utf8(out.stdout).context("decode yt-dlp stdout")?;
    first_url(&stdout)
        .map(str::to_string)
        .context("yt-dlp returned empty url")
}

fn first_url(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("http"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_url_skips_noise() {
        let out = "\n  \nWARNING: something\nhttps://rr1.example/audio?x=1\nhttps://other\n";
        assert_eq!(first_url(out), Some("https://rr1.example/audio?x=1"));
        assert_eq!(first_url("nothing here"), None);
    }
}
