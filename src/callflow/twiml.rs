//! Instruction documents returned to the call-control provider.

use anyhow::Result;
use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say {
        text: String,
        voice: Option<String>,
        language: Option<String>,
    },
    Play {
        url: String,
    },
    Pause {
        length: u32,
    },
    Gather {
        action: String,
        timeout: u32,
        num_digits: u32,
        prompts: Vec<Verb>,
    },
    Dial {
        action: String,
        timeout: u32,
        caller_id: Option<String>,
        number: String,
        /// Run on the dialed party before the legs are bridged.
        url: Option<String>,
    },
    Redirect {
        url: String,
    },
    Hangup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwimlResponse {
    verbs: Vec<Verb>,
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn push(&mut self, verb: Verb) {
        self.verbs.push(verb);
    }

    pub fn hangup(self) -> Self {
        self.with(Verb::Hangup)
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn hangs_up(&self) -> bool {
        matches!(self.verbs.last(), Some(Verb::Hangup))
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("Response")))?;
        for verb in &self.verbs {
            write_verb(&mut writer, verb)?;
        }
        writer.write_event(Event::End(BytesStart::new("Response").to_end()))?;
        Ok(String::from_utf8(writer.into_inner().into_inner())?)
    }
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    element: BytesStart<'_>,
    text: &str,
) -> Result<()> {
    let end = element.to_end().into_owned();
    writer.write_event(Event::Start(element))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

fn write_verb(writer: &mut Writer<Cursor<Vec<u8>>>, verb: &Verb) -> Result<()> {
    match verb {
        Verb::Say {
            text,
            voice,
            language,
        } => {
            let mut say = BytesStart::new("Say");
            if let Some(voice) = voice {
                say.push_attribute(("voice", voice.as_str()));
            }
            if let Some(language) = language {
                say.push_attribute(("language", language.as_str()));
            }
            write_text_element(writer, say, text)
        }
        Verb::Play { url } => write_text_element(writer, BytesStart::new("Play"), url),
        Verb::Pause { length } => {
            let mut pause = BytesStart::new("Pause");
            pause.push_attribute(("length", length.to_string().as_str()));
            writer.write_event(Event::Empty(pause))?;
            Ok(())
        }
        Verb::Gather {
            action,
            timeout,
            num_digits,
            prompts,
        } => {
            let mut gather = BytesStart::new("Gather");
            gather.push_attribute(("action", action.as_str()));
            gather.push_attribute(("method", "POST"));
            gather.push_attribute(("timeout", timeout.to_string().as_str()));
            gather.push_attribute(("numDigits", num_digits.to_string().as_str()));
            writer.write_event(Event::Start(gather))?;
            for prompt in prompts {
                write_verb(writer, prompt)?;
            }
            writer.write_event(Event::End(BytesStart::new("Gather").to_end()))?;
            Ok(())
        }
        Verb::Dial {
            action,
            timeout,
            caller_id,
            number,
            url,
        } => {
            let mut dial = BytesStart::new("Dial");
            dial.push_attribute(("action", action.as_str()));
            dial.push_attribute(("method", "POST"));
            dial.push_attribute(("timeout", timeout.to_string().as_str()));
            if let Some(caller_id) = caller_id {
                dial.push_attribute(("callerId", caller_id.as_str()));
            }
            writer.write_event(Event::Start(dial))?;
            let mut element = BytesStart::new("Number");
            if let Some(url) = url {
                element.push_attribute(("url", url.as_str()));
                element.push_attribute(("method", "POST"));
            }
            write_text_element(writer, element, number)?;
            writer.write_event(Event::End(BytesStart::new("Dial").to_end()))?;
            Ok(())
        }
        Verb::Redirect { url } => {
            let mut redirect = BytesStart::new("Redirect");
            redirect.push_attribute(("method", "POST"));
            write_text_element(writer, redirect, url)
        }
        Verb::Hangup => {
            writer.write_event(Event::Empty(BytesStart::new("Hangup")))?;
            Ok(())
        }
    }
}

impl IntoResponse for TwimlResponse {
    fn into_response(self) -> Response {
        match self.to_xml() {
            Ok(xml) => ([(CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response(),
            Err(e) => {
                error!("failed to render instruction document: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
