use super::message::{DnsFlags, DnsMessage, DnsQuestion, DnsRecord, DnsResponseCode, Edns};

/// Builder
#[derive(Debug, Clone, Default)]
pub struct DnsMessageBuilder {
    id: u16,
    flags: DnsFlags,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    authority_records: Vec<DnsRecord>,
    additional_records: Vec<DnsRecord>,
    edns: Option<Edns>,
    response_code: Option<DnsResponseCode>,
}

impl DnsMessageBuilder {
    /// Create a new builder for a recursive query.
    pub fn new() -> Self {
        Self {
            flags: DnsFlags {
                recursion_desired: true,
                ..DnsFlags::default()
            },
            ..Self::default()
        }
    }

    /// Start a response to `query`: same id, opcode and questions, RD copied, RA set.
    pub fn reply_to(query: &DnsMessage) -> Self {
        Self {
            id: query.id,
            flags: DnsFlags {
                response: true,
                opcode: query.flags.opcode,
                recursion_desired: query.flags.recursion_desired,
                recursion_available: true,
                checking_disabled: query.flags.checking_disabled,
                ..DnsFlags::default()
            },
            questions: query.questions().to_vec(),
            ..Self::default()
        }
    }

    /// Set the ID for the DNS packet.
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set the flags for the DNS packet.
    pub fn with_flags(mut self, flags: DnsFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn add_question(mut self, question: DnsQuestion) -> Self {
        self.questions.push(question);
        self
    }

    pub fn add_answer(mut self, answer: DnsRecord) -> Self {
        self.answers.push(answer);
        self
    }

    pub fn add_authority_record(mut self, record: DnsRecord) -> Self {
        self.authority_records.push(record);
        self
    }

    pub fn add_additional_record(mut self, record: DnsRecord) -> Self {
        self.additional_records.push(record);
        self
    }

    pub fn with_answers(mut self, answers: Vec<DnsRecord>) -> Self {
        self.answers = answers;
        self
    }

    pub fn with_authority_records(mut self, records: Vec<DnsRecord>) -> Self {
        self.authority_records = records;
        self
    }

    pub fn with_additional_records(mut self, records: Vec<DnsRecord>) -> Self {
        self.additional_records = records;
        self
    }

    pub fn with_edns(mut self, edns: Edns) -> Self {
        self.edns = Some(edns);
        self
    }

    /// Mark the message as a response carrying `response_code`.
    pub fn with_response(mut self, response_code: DnsResponseCode) -> Self {
        self.response_code = Some(response_code);
        self
    }

    pub fn build(self) -> DnsMessage {
        let mut message = DnsMessage::new(
            self.id,
            self.flags,
            self.questions,
            self.answers,
            self.authority_records,
            self.additional_records,
        );
        message.set_edns(self.edns);

        if let Some(rcode) = self.response_code {
            message.flags.response = true;
            message.set_response_code(rcode);
        }

        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassType, DomainName, RecordType, message::DnsOpcode};

    #[test]
    fn test_reply_to_copies_header() {
        let query = DnsMessageBuilder::new()
            .with_id(4242)
            .add_question(DnsQuestion::new(
                DomainName::from_ascii("example.com").unwrap(),
                RecordType::AAAA,
                ClassType::IN,
            ))
            .build();

        let reply = DnsMessageBuilder::reply_to(&query)
            .with_response(DnsResponseCode::NxDomain)
            .build();

        assert_eq!(reply.id, 4242);
        assert!(reply.flags.response);
        assert!(reply.flags.recursion_desired);
        assert!(reply.flags.recursion_available);
        assert_eq!(reply.flags.opcode, DnsOpcode::Query);
        assert_eq!(reply.questions(), query.questions());
        assert_eq!(reply.response_code(), DnsResponseCode::NxDomain);
    }
}
