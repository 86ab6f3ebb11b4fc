use mllpsim_frame::Envelope;
use mllpsim_hl7::AckCode;
use regex::Regex;

/// Counter-based fault trigger.
///
/// `0` never triggers, `1` triggers on every message, and `n > 1` triggers
/// on every n-th message (`counter % n == 0`). Counters start at 1 for the
/// first message on a connection, so a modulus of 3 fires on messages
/// 3, 6, 9, …
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModulusRule(u64);

impl ModulusRule {
    /// The rule that never triggers.
    pub const NEVER: ModulusRule = ModulusRule(0);
    /// The rule that triggers on every message.
    pub const ALWAYS: ModulusRule = ModulusRule(1);

    /// Build a rule from a configured modulus. Negative values clamp to
    /// zero (never trigger).
    pub fn new(modulus: i64) -> Self {
        Self(modulus.max(0) as u64)
    }

    /// Evaluate the rule against a message counter.
    pub fn matches(self, counter: u64) -> bool {
        match self.0 {
            0 => false,
            1 => true,
            n => counter % n == 0,
        }
    }
}

/// Content-based fault trigger: a regular expression matched against the
/// full text of an inbound message.
#[derive(Debug, Clone, Default)]
pub struct PatternRule(Option<Regex>);

impl PatternRule {
    /// Compile a rule. The expression must match the *entire* message text
    /// to trigger; it is anchored during compilation.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let anchored = Regex::new(&format!(r"\A(?s:{pattern})\z"))?;
        Ok(Self(Some(anchored)))
    }

    /// Evaluate the rule. An absent pattern never matches.
    pub fn matches(&self, message: &str) -> bool {
        self.0.as_ref().is_some_and(|re| re.is_match(message))
    }

    /// True when a pattern is configured.
    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }
}

/// The full set of fault-injection knobs, evaluated once per inbound
/// message against that connection's message counter.
///
/// The policy is immutable once the server starts: workers on concurrent
/// connections read it without synchronization, and no decision depends on
/// any other connection's state.
#[derive(Debug, Clone, Default)]
pub struct FaultPolicy {
    /// Withhold `START_OF_BLOCK` from every n-th acknowledgement.
    pub exclude_start_of_block: ModulusRule,
    /// Withhold `END_OF_BLOCK` from every n-th acknowledgement.
    pub exclude_end_of_block: ModulusRule,
    /// Withhold `END_OF_DATA` from every n-th acknowledgement.
    pub exclude_end_of_data: ModulusRule,
    /// Withhold the acknowledgement body (envelope bytes still sent).
    pub exclude_acknowledgement: ModulusRule,
    /// Write non-protocol bytes before the envelope of every n-th response.
    pub send_out_of_band_data: ModulusRule,
    /// Drop the connection before acknowledging every n-th message.
    pub disconnect_before_acknowledgement: ModulusRule,
    /// Drop the connection after acknowledging every n-th message.
    pub disconnect_after_acknowledgement: ModulusRule,
    /// Answer every n-th message with an `AR` acknowledgement.
    pub reject_acknowledgement: ModulusRule,
    /// Answer every n-th message with an `AE` acknowledgement.
    pub error_acknowledgement: ModulusRule,
    /// Answer any message matching this pattern with `AR`.
    pub reject_acknowledgement_pattern: PatternRule,
    /// Answer any message matching this pattern with `AE`.
    pub error_acknowledgement_pattern: PatternRule,
}

impl FaultPolicy {
    /// Evaluate every rule against one message.
    ///
    /// Pattern rules apply only to the acknowledgement-code decisions and
    /// are OR-combined with their modulus counterpart.
    pub fn decide(&self, counter: u64, message: &str) -> FaultDecision {
        FaultDecision {
            exclude_start_of_block: self.exclude_start_of_block.matches(counter),
            exclude_end_of_block: self.exclude_end_of_block.matches(counter),
            exclude_end_of_data: self.exclude_end_of_data.matches(counter),
            exclude_acknowledgement: self.exclude_acknowledgement.matches(counter),
            send_out_of_band_data: self.send_out_of_band_data.matches(counter),
            disconnect_before_acknowledgement: self
                .disconnect_before_acknowledgement
                .matches(counter),
            disconnect_after_acknowledgement: self
                .disconnect_after_acknowledgement
                .matches(counter),
            reject_acknowledgement: self.reject_acknowledgement.matches(counter)
                || self.reject_acknowledgement_pattern.matches(message),
            error_acknowledgement: self.error_acknowledgement.matches(counter)
                || self.error_acknowledgement_pattern.matches(message),
        }
    }

    /// Restore a fully well-formed envelope on every response.
    pub fn enable_envelope(&mut self) {
        self.exclude_start_of_block = ModulusRule::NEVER;
        self.exclude_end_of_block = ModulusRule::NEVER;
        self.exclude_end_of_data = ModulusRule::NEVER;
    }

    /// Withhold the whole envelope from every n-th response.
    pub fn disable_envelope(&mut self, nth: i64) {
        self.exclude_start_of_block = ModulusRule::new(nth);
        self.exclude_end_of_block = ModulusRule::new(nth);
        self.exclude_end_of_data = ModulusRule::new(nth);
    }

    /// Withhold `START_OF_BLOCK` from every n-th response.
    pub fn disable_envelope_start(&mut self, nth: i64) {
        self.exclude_start_of_block = ModulusRule::new(nth);
    }

    /// Withhold the envelope end pair from every n-th response.
    pub fn disable_envelope_end(&mut self, nth: i64) {
        self.exclude_end_of_block = ModulusRule::new(nth);
        self.exclude_end_of_data = ModulusRule::new(nth);
    }

    /// Restore complete responses.
    pub fn enable_response(&mut self) {
        self.enable_envelope();
        self.exclude_acknowledgement = ModulusRule::NEVER;
    }

    /// Suppress the entire response (envelope and body) for every n-th
    /// message.
    pub fn disable_response(&mut self, nth: i64) {
        self.disable_envelope(nth);
        self.exclude_acknowledgement = ModulusRule::new(nth);
    }
}

/// The per-message outcome of evaluating a [`FaultPolicy`]. Every decision
/// is independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultDecision {
    pub exclude_start_of_block: bool,
    pub exclude_end_of_block: bool,
    pub exclude_end_of_data: bool,
    pub exclude_acknowledgement: bool,
    pub send_out_of_band_data: bool,
    pub disconnect_before_acknowledgement: bool,
    pub disconnect_after_acknowledgement: bool,
    pub reject_acknowledgement: bool,
    pub error_acknowledgement: bool,
}

impl FaultDecision {
    /// The envelope flags for the acknowledgement write.
    pub fn envelope(&self) -> Envelope {
        Envelope {
            start_of_block: !self.exclude_start_of_block,
            end_of_block: !self.exclude_end_of_block,
            end_of_data: !self.exclude_end_of_data,
        }
    }

    /// The acknowledgement code this message earns: `AE` wins over `AR`,
    /// and `AA` is the default.
    pub fn ack_code(&self) -> AckCode {
        if self.error_acknowledgement {
            AckCode::ApplicationError
        } else if self.reject_acknowledgement {
            AckCode::ApplicationReject
        } else {
            AckCode::Accept
        }
    }
}
