//! Command dispatch: named actions mapped to handlers over the session
//! context, decoupled from any particular UI toolkit. The UI layer resolves
//! a widget interaction to an action name and hands the outcome back to
//! whatever display it owns.

use std::collections::HashMap;

use crate::session::SessionContext;

/// What a handled command asks the caller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The session moved to a fresh conversation; clear the view.
    Reset,
    /// Search mode flipped; true means the input now filters conversations.
    Search(bool),
    /// Pre-fill the input field with this draft.
    Draft(String),
    /// Show this informational markup in the display region.
    Notice(String),
}

type CommandHandler = Box<dyn Fn(&mut SessionContext) -> CommandOutcome + Send + Sync>;

/// Registry of named actions. Built-ins cover the navigation actions, the
/// quick prompts, and the input-icon stubs; callers may register more.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, CommandHandler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };

        reg.register("new-chat", |ctx| {
            ctx.new_conversation();
            CommandOutcome::Reset
        });
        reg.register("search", |ctx| CommandOutcome::Search(ctx.toggle_search()));

        for (action, feature) in [("images", "Images"), ("apps", "Apps"), ("projects", "Projects")] {
            reg.register(action, move |_ctx| {
                CommandOutcome::Notice(format!(
                    "<strong>{feature} feature</strong> is coming soon! 🚀"
                ))
            });
        }

        for (action, prompt) in QUICK_PROMPTS {
            reg.register(action, move |_ctx| CommandOutcome::Draft(prompt.to_string()));
        }

        reg.register("voice", |_ctx| {
            CommandOutcome::Notice("Voice input - coming soon".to_string())
        });
        reg.register("attach", |_ctx| {
            CommandOutcome::Notice("File attachment - coming soon".to_string())
        });

        reg
    }

    pub fn register<F>(&mut self, action: &'static str, handler: F)
    where
        F: Fn(&mut SessionContext) -> CommandOutcome + Send + Sync + 'static,
    {
        self.handlers.insert(action, Box::new(handler));
    }

    /// Run the handler for `action`. Unknown actions are logged and return
    /// `None`; they are not errors.
    pub fn dispatch(&self, action: &str, ctx: &mut SessionContext) -> Option<CommandOutcome> {
        match self.handlers.get(action) {
            Some(handler) => Some(handler(ctx)),
            None => {
                tracing::warn!(action = %action, "unknown action");
                None
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Canned prompts behind the quick-action buttons.
const QUICK_PROMPTS: [(&str, &str); 4] = [
    (
        "code",
        "Generate a simple Python script that prints a greeting",
    ),
    (
        "explain",
        "Explain the concept of machine learning in simple terms",
    ),
    (
        "creative",
        "Write a short creative story about an AI discovering consciousness",
    ),
    ("analyze", "Analyze the pros and cons of remote work"),
];
