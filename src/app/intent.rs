/// A structured command as the host would deliver it after recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Intent {
    Listen {
        show: Option<String>,
        utterance: String,
    },
    NextEpisode {
        show: Option<String>,
    },
    PreviousEpisode {
        show: Option<String>,
    },
    Pause,
    Resume,
    Stop,
    List {
        show: Option<String>,
    },
    Info {
        show: Option<String>,
    },
    CompetingActivityStarted,
    Quit,
    Unknown(String),
}

const FILLER_WORDS: &[&str] = &["episode", "episodes", "of", "for", "to", "from", "the"];

pub(crate) fn parse_intent(line: &str) -> Option<Intent> {
    let utterance = line.trim();
    if utterance.is_empty() {
        return None;
    }

    let (verb, rest) = match utterance.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest),
        None => (utterance, ""),
    };

    let intent = match verb.to_lowercase().as_str() {
        "listen" | "play" => Intent::Listen {
            show: show_argument(rest),
            utterance: utterance.to_string(),
        },
        "next" => Intent::NextEpisode {
            show: show_argument(rest),
        },
        "previous" | "prev" | "back" => Intent::PreviousEpisode {
            show: show_argument(rest),
        },
        "pause" => Intent::Pause,
        "resume" | "continue" | "unpause" => Intent::Resume,
        "stop" => Intent::Stop,
        "list" | "episodes" => Intent::List {
            show: show_argument(rest),
        },
        "info" | "describe" => Intent::Info {
            show: show_argument(rest),
        },
        "record-begin" | "duck" => Intent::CompetingActivityStarted,
        "quit" | "exit" => Intent::Quit,
        _ => Intent::Unknown(utterance.to_string()),
    };
    Some(intent)
}

/// Strips leading filler ("episode of", "to the") so "next episode of the
/// daily" names "daily". Only leading filler is dropped.
pub(crate) fn show_argument(rest: &str) -> Option<String> {
    let mut words = rest.split_whitespace().peekable();
    while words
        .peek()
        .is_some_and(|word| FILLER_WORDS.contains(&word.to_lowercase().as_str()))
    {
        words.next();
    }
    let show = words.collect::<Vec<_>>().join(" ");
    if show.is_empty() { None } else { Some(show) }
}
