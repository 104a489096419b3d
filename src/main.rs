#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

fn main() {
    if let Err(e) = mention_notifier::run() {
        eprintln!("mention-notifier: {e}");
        std::process::exit(1);
    }
}
