//! Argument builders for the transform stages.

use std::path::Path;

use bclip_models::{CANVAS_HEIGHT, CANVAS_WIDTH, MAX_CLIP_SECONDS, THUMBNAIL_TIMESTAMP};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;

/// Scale into the canvas preserving aspect ratio, then pad to fill it
/// with the picture centered. Never crops.
pub fn canvas_filter() -> String {
    format!(
        "scale=w={w}:h={h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = CANVAS_WIDTH,
        h = CANVAS_HEIGHT
    )
}

/// Cap the clip at [`MAX_CLIP_SECONDS`], keeping the original encoding.
pub fn trim_command(input: impl AsRef<Path>, output: impl AsRef<Path>) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .duration_secs(MAX_CLIP_SECONDS)
        .copy_streams()
}

/// Grab the first frame as a still image.
pub fn thumbnail_command(input: impl AsRef<Path>, output: impl AsRef<Path>) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek_output(THUMBNAIL_TIMESTAMP)
        .single_frame()
}

/// Letterbox/pillarbox onto the canvas. Audio is passed through.
pub fn scale_to_canvas_command(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_filter(canvas_filter())
        .audio_codec("copy")
}

/// Join the segments listed in a concat demuxer file without re-encoding.
///
/// All segments must share codec, resolution and frame rate.
pub fn concat_command(list: impl AsRef<Path>, output: impl AsRef<Path>) -> FfmpegCommand {
    FfmpegCommand::new(list, output)
        .input_format("concat")
        .input_arg("-safe")
        .input_arg("0")
        .copy_streams()
}

/// Strip audio, keep the video stream as-is.
pub fn mute_command(input: impl AsRef<Path>, output: impl AsRef<Path>) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .no_audio()
        .video_codec("copy")
}

/// Write a concat demuxer list with the segments in order.
pub async fn write_concat_list(list: impl AsRef<Path>, segments: &[&Path]) -> MediaResult<()> {
    let mut body = String::new();
    for segment in segments {
        body.push_str("file '");
        body.push_str(&escape_concat_path(segment));
        body.push_str("'\n");
    }
    tokio::fs::write(list, body).await?;
    Ok(())
}

// The concat demuxer reads single-quoted strings; a literal quote is '\''.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canvas_filter() {
        assert_eq!(
            canvas_filter(),
            "scale=w=1280:h=720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2"
        );
    }

    #[test]
    fn test_trim_args() {
        let args = trim_command("/w/original.mp4", "/w/video_trim.mp4").build_args();
        assert_eq!(
            args,
            vec![
                "-y", "-v", "error", "-i", "/w/original.mp4", "-t", "30", "-c", "copy",
                "/w/video_trim.mp4"
            ]
        );
    }

    #[test]
    fn test_thumbnail_args() {
        let args = thumbnail_command("/w/original.mp4", "/w/thumb.jpg").build_args();
        assert_eq!(
            &args[3..],
            &["-i", "/w/original.mp4", "-ss", "00:00:00", "-vframes", "1", "/w/thumb.jpg"]
        );
    }

    #[test]
    fn test_scale_copies_audio() {
        let args = scale_to_canvas_command("in.mp4", "out.mp4").build_args();
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], canvas_filter());
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "copy"));
    }

    #[test]
    fn test_concat_args() {
        let args = concat_command("/w/concat.txt", "/w/final.mp4").build_args();
        assert_eq!(
            args,
            vec![
                "-y", "-v", "error", "-f", "concat", "-safe", "0", "-i", "/w/concat.txt", "-c",
                "copy", "/w/final.mp4"
            ]
        );
    }

    #[test]
    fn test_mute_args() {
        let args = mute_command("final.mp4", "final_noaudio.mp4").build_args();
        assert_eq!(&args[5..], &["-an", "-c:v", "copy", "final_noaudio.mp4"]);
    }

    #[tokio::test]
    async fn test_concat_list_order_and_escaping() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("concat.txt");
        let intro = Path::new("/w/intro_720.mp4");
        let main = Path::new("/w/it's main.mp4");
        let outro = Path::new("/w/outro_720.mp4");

        write_concat_list(&list, &[intro, main, outro]).await.unwrap();

        let body = tokio::fs::read_to_string(&list).await.unwrap();
        assert_eq!(
            body,
            "file '/w/intro_720.mp4'\nfile '/w/it'\\''s main.mp4'\nfile '/w/outro_720.mp4'\n"
        );
    }
}
