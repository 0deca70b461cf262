//! Terminal color policy for log output.
//!
//! The `--color` flag wins when explicit. In `auto` mode, `NO_COLOR` and
//! `EMACS` disable color, otherwise the stream must be a TTY.

use std::env;

/// When to emit ANSI colors.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorWhen {
    /// Enable colors only when output is a TTY.
    #[default]
    Auto,

    /// Always enable colors.
    Always,

    /// Never enable colors.
    Never,
}

/// Snapshot of the environment inputs that drive the `auto` decision.
#[derive(Debug, Clone, Copy, Default)]
struct Environment {
    no_color: bool,
    emacs: bool,
    is_tty: bool,
}

impl Environment {
    // ---
    fn probe(stream: atty::Stream) -> Self {
        // ---
        Self {
            no_color: env::var_os("NO_COLOR").is_some(),
            emacs: env::var_os("EMACS").is_some(),
            is_tty: atty::is(stream),
        }
    }
}

impl ColorWhen {
    // ---
    /// Returns whether log lines written to stderr should carry ANSI color.
    pub fn should_color_stderr(self) -> bool {
        // ---
        self.decide(Environment::probe(atty::Stream::Stderr))
    }

    fn decide(self, env: Environment) -> bool {
        // ---
        match self {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => !env.no_color && !env.emacs && env.is_tty,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    const TTY: Environment = Environment {
        no_color: false,
        emacs: false,
        is_tty: true,
    };

    #[test]
    fn auto_colors_a_plain_tty() {
        // ---
        assert!(ColorWhen::Auto.decide(TTY));
    }

    #[test]
    fn auto_respects_no_color_and_emacs() {
        // ---
        let no_color = Environment { no_color: true, ..TTY };
        let emacs = Environment { emacs: true, ..TTY };

        assert!(!ColorWhen::Auto.decide(no_color));
        assert!(!ColorWhen::Auto.decide(emacs));
    }

    #[test]
    fn auto_is_plain_when_piped() {
        // ---
        let piped = Environment { is_tty: false, ..TTY };
        assert!(!ColorWhen::Auto.decide(piped));
    }

    #[test]
    fn explicit_choice_wins() {
        // ---
        let hostile = Environment {
            no_color: true,
            emacs: true,
            is_tty: false,
        };
        assert!(ColorWhen::Always.decide(hostile));
        assert!(!ColorWhen::Never.decide(TTY));
    }
}
