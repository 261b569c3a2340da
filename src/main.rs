use std::env;
use std::fs;
use std::process;

use chordflow::classify::{classify, LineKind};
use chordflow::model::{PerformancePosition, TimeSignature};
use chordflow::render::to_text;
use chordflow::scroll::ScrollParams;
use chordflow::transpose::{semitone_interval, transpose_text};
use chordflow::{ParticipantRole, RenderOptions, Renderer, Song};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: chordflow classify <file>
       chordflow transpose <file> <from-key> <to-key> [--flats]
       chordflow render <song.yaml> <role> [--simplify] [--all]
       chordflow scroll <tempo> <time-signature> [multiplier]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        fail(USAGE);
    };

    let result = match command.as_str() {
        "classify" => classify_command(&args[1..]),
        "transpose" => transpose_command(&args[1..]),
        "render" => render_command(&args[1..]),
        "scroll" => scroll_command(&args[1..]),
        _ => Err(USAGE.to_string()),
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(message) => fail(&message),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading file '{}': {}", path, e))
}

fn classify_command(args: &[String]) -> Result<String, String> {
    let [path] = args else {
        return Err(USAGE.to_string());
    };
    let source = read(path)?;
    let lines: Vec<String> = source
        .lines()
        .map(|line| {
            let tag = match classify(line) {
                LineKind::Chord => "chord",
                LineKind::Lyric => "lyric",
            };
            format!("{:<5} | {}", tag, line)
        })
        .collect();
    Ok(lines.join("\n"))
}

fn transpose_command(args: &[String]) -> Result<String, String> {
    let prefer_sharps = !args.iter().any(|a| a == "--flats");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let [path, from, to] = positional.as_slice() else {
        return Err(USAGE.to_string());
    };
    let source = read(path)?;
    let semitones = semitone_interval(from, to).map_err(|e| e.to_string())?;
    Ok(transpose_text(&source, semitones, prefer_sharps))
}

fn render_command(args: &[String]) -> Result<String, String> {
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let [path, role] = positional.as_slice() else {
        return Err(USAGE.to_string());
    };
    let role = ParticipantRole::from_str(role).ok_or_else(|| format!("Unknown role '{}'", role))?;
    let song = Song::from_yaml_str(&read(path)?).map_err(|e| e.to_string())?;

    let options = RenderOptions {
        theme: song.theme,
        simplify_chords: args.iter().any(|a| a == "--simplify"),
        show_all_sections: args.iter().any(|a| a == "--all"),
    };
    let mut position = PerformancePosition::default();
    position.resolve_against(&song);
    Ok(to_text(&Renderer::new().render_song(&song, &position, role, &options)))
}

fn scroll_command(args: &[String]) -> Result<String, String> {
    let (tempo, signature, multiplier) = match args {
        [tempo, signature] => (tempo, signature, None),
        [tempo, signature, multiplier] => (tempo, signature, Some(multiplier)),
        _ => return Err(USAGE.to_string()),
    };
    let tempo: u32 = tempo.parse().map_err(|_| format!("Invalid tempo '{}'", tempo))?;
    let time_signature =
        TimeSignature::from_str(signature).ok_or_else(|| format!("Invalid time signature '{}'", signature))?;
    let multiplier: f32 = match multiplier {
        Some(m) => m.parse().map_err(|_| format!("Invalid multiplier '{}'", m))?,
        None => 1.0,
    };

    let params = ScrollParams::new(tempo, time_signature, multiplier);
    Ok(format!(
        "seconds/line: {:.3}\npixels/second: {:.3}\npixels/tick: {:.3}",
        chordflow::scroll::seconds_per_line(tempo, &time_signature),
        params.pixels_per_second(),
        params.pixels_per_tick()
    ))
}
