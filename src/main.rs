use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    audio_steg_lib::run(args)
        .await
        .context("audio-steg failed")
}
