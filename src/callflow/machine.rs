use super::{
    escalation::{escalation_order, new_seed, DialTarget},
    twiml::{TwimlResponse, Verb},
    urls::CallbackUrls,
};
use crate::{
    config::{Prompt, VoiceConfig},
    directory::{ActiveMessage, Directory},
    error::Result,
};
use chrono::{DateTime, Utc};

/// One inbound callback, already tied to its logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Start { from: String, to: String },
    Gathered { digits: String },
    GatherFailed,
    DialHuman { seed: u64, index: usize },
    HumanPickup { seed: u64, index: usize },
    HumanEnded { seed: u64, index: usize, status: String },
    ForwardPickup,
    ForwardEnded { status: String },
    Terminated { from: String, status: String, duration: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallNotice {
    pub subject: String,
    pub summary: String,
}

/// What a callback produces: the audit lines to persist, then the document
/// to answer with. `notice` is set once the whole call has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub log: Vec<String>,
    pub response: TwimlResponse,
    pub notice: Option<CallNotice>,
}

impl Transition {
    fn new(response: TwimlResponse) -> Self {
        Self {
            log: Vec::new(),
            response,
            notice: None,
        }
    }

    fn log(mut self, line: impl Into<String>) -> Self {
        self.log.push(line.into());
        self
    }
}

pub struct CallFlow {
    voice: VoiceConfig,
    urls: CallbackUrls,
    seed_source: fn() -> u64,
}

impl CallFlow {
    pub fn new(voice: VoiceConfig, urls: CallbackUrls) -> Self {
        Self {
            voice,
            urls,
            seed_source: new_seed,
        }
    }

    pub fn with_seed_source(mut self, seed_source: fn() -> u64) -> Self {
        self.seed_source = seed_source;
        self
    }

    pub fn prompt(&self, prompt: &Prompt) -> Verb {
        match prompt {
            Prompt::Say { text } => self.say(text),
            Prompt::Play { url } => Verb::Play { url: url.clone() },
        }
    }

    fn say(&self, text: &str) -> Verb {
        Verb::Say {
            text: text.to_string(),
            voice: self.voice.voice.clone(),
            language: self.voice.language.clone(),
        }
    }

    fn menu(&self, mut response: TwimlResponse) -> TwimlResponse {
        response.push(Verb::Gather {
            action: self.urls.gathered(),
            timeout: self.voice.gather_timeout,
            num_digits: 1,
            prompts: vec![self.prompt(&self.voice.menu)],
        });
        response.with(Verb::Redirect {
            url: self.urls.gather_failed(),
        })
    }

    fn dial(&self, number: &str, action: String, pickup_url: String) -> Verb {
        Verb::Dial {
            action,
            timeout: self.voice.dial_timeout,
            caller_id: self.voice.caller_id.clone(),
            number: number.to_string(),
            url: Some(pickup_url),
        }
    }

    pub async fn handle(
        &self,
        sid: &str,
        event: CallEvent,
        directory: &dyn Directory,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let transition = match event {
            CallEvent::Start { from, to } => {
                let message = directory.active_message(now).await?;
                self.start(sid, &from, &to, message.as_ref())
            }
            CallEvent::Gathered { digits } => self.gathered(&digits),
            CallEvent::GatherFailed => {
                Transition::new(TwimlResponse::new().hangup()).log("gather failed")
            }
            CallEvent::DialHuman { seed, index } => {
                let humans = directory.enabled_humans().await?;
                self.dial_human(sid, seed, index, &escalation_order(seed, &humans))
            }
            CallEvent::HumanPickup { seed, index } => Transition::new(TwimlResponse::new())
                .log(format!("human {} picked up (seed {})", index, seed)),
            CallEvent::HumanEnded {
                seed,
                index,
                status,
            } => self.human_ended(seed, index, &status),
            CallEvent::ForwardPickup => {
                Transition::new(TwimlResponse::new()).log("forward picked up")
            }
            CallEvent::ForwardEnded { status } => self.forward_ended(&status),
            CallEvent::Terminated {
                from,
                status,
                duration,
            } => {
                let mut transition = Transition::new(TwimlResponse::new().hangup())
                    .log(format!("status callback {}; {} seconds", status, duration));
                transition.notice = Some(CallNotice {
                    subject: format!("call {}", status),
                    summary: format!("call from {} {} after {} seconds", from, status, duration),
                });
                transition
            }
        };
        Ok(transition)
    }

    fn start(&self, sid: &str, from: &str, to: &str, message: Option<&ActiveMessage>) -> Transition {
        let started = format!("started: call from {} to {}", from, to);
        if let Some((message, target)) =
            message.and_then(|m| m.forward_to.as_ref().map(|t| (m, t)))
        {
            let response = TwimlResponse::new().with(self.dial(
                target.phone.as_str(),
                self.urls.forward_ended(),
                self.urls.forward_pickup(sid),
            ));
            return Transition::new(response).log(started).log(format!(
                "forwarding to {} ({}) for message {}",
                target.name, target.phone, message.id
            ));
        }

        let mut response = TwimlResponse::new().with(self.prompt(&self.voice.greeting));
        let mut transition_log = vec![started];
        match message {
            Some(message) => {
                response.push(self.say(&message.call_text));
                transition_log.push(format!("announcing message {}", message.id));
            }
            None => response.push(self.prompt(&self.voice.no_launch)),
        }
        response.push(Verb::Pause { length: 1 });
        let mut transition = Transition::new(self.menu(response));
        transition.log = transition_log;
        transition
    }

    fn gathered(&self, digits: &str) -> Transition {
        match digits {
            "1" => Transition::new(TwimlResponse::new().hangup()).log("ended by option"),
            "2" => {
                let seed = (self.seed_source)();
                let response = TwimlResponse::new()
                    .with(self.prompt(&self.voice.connecting))
                    .with(Verb::Redirect {
                        url: self.urls.human(seed, 0),
                    });
                Transition::new(response).log(format!("gathered 2: escalating with seed {}", seed))
            }
            other => Transition::new(self.menu(TwimlResponse::new()))
                .log(format!("invalid keypress {:?}", other)),
        }
    }

    fn dial_human(
        &self,
        sid: &str,
        seed: u64,
        index: usize,
        order: &[DialTarget],
    ) -> Transition {
        match order.get(index) {
            Some(target) => {
                let response = TwimlResponse::new().with(self.dial(
                    target.phone.as_str(),
                    self.urls.human_ended(seed, index),
                    self.urls.human_pickup(seed, index, sid),
                ));
                Transition::new(response).log(format!(
                    "dialing human {}: {} ({})",
                    index, target.name, target.phone
                ))
            }
            None => self.exhausted(seed, index),
        }
    }

    fn exhausted(&self, seed: u64, attempts: usize) -> Transition {
        let response = TwimlResponse::new()
            .with(self.prompt(&self.voice.exhausted))
            .hangup();
        Transition::new(response).log(format!(
            "humans exhausted after {} attempts (seed {})",
            attempts, seed
        ))
    }

    fn human_ended(&self, seed: u64, index: usize, status: &str) -> Transition {
        if status == "completed" {
            return Transition::new(TwimlResponse::new().hangup())
                .log(format!("human {} call completed", index));
        }
        let failed = format!("human {} call failed: {}", index, status);
        match index.checked_add(1) {
            Some(next) => {
                let response = TwimlResponse::new().with(Verb::Redirect {
                    url: self.urls.human(seed, next),
                });
                Transition::new(response).log(failed)
            }
            None => {
                let mut transition = self.exhausted(seed, index);
                transition.log.insert(0, failed);
                transition
            }
        }
    }

    fn forward_ended(&self, status: &str) -> Transition {
        if status == "completed" {
            return Transition::new(TwimlResponse::new().hangup()).log("forward call completed");
        }
        let response = TwimlResponse::new()
            .with(self.prompt(&self.voice.forward_failed))
            .hangup();
        Transition::new(response).log(format!("forward call failed: {}", status))
    }
}
