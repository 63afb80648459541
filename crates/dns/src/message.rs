use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::{Context, ensure};
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    domain_name::DomainName,
    reader::{DnsMessageReader, DnsReadable},
    writer::{DnsMessageWriter, DnsWritable, MAX_MESSAGE_SIZE},
};

/// Represents a DNS message.
///
/// An EDNS OPT pseudo-record is lifted out of the additional section into
/// [`Edns`] on decode and appended again on encode.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsMessage {
    /// Transaction id
    pub id: u16,
    /// Flags
    pub flags: DnsFlags,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    authority_records: Vec<DnsRecord>,
    additional_records: Vec<DnsRecord>,
    edns: Option<Edns>,
}

impl DnsMessage {
    pub fn new(
        id: u16,
        flags: DnsFlags,
        questions: Vec<DnsQuestion>,
        answers: Vec<DnsRecord>,
        authority_records: Vec<DnsRecord>,
        additional_records: Vec<DnsRecord>,
    ) -> Self {
        Self {
            id,
            flags,
            questions,
            answers,
            authority_records,
            additional_records,
            edns: None,
        }
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let mut reader = DnsMessageReader::new(data);

        let id = reader.read_u16()?;
        let flags = DnsFlags::read_from(&mut reader)?;

        let number_of_questions = reader.read_u16()?; // QDCOUNT
        let number_of_answers = reader.read_u16()?; // ANCOUNT
        let number_of_authority_records = reader.read_u16()?; // NSCOUNT
        let number_of_additional_records = reader.read_u16()?; // ARCOUNT

        let mut questions = Vec::with_capacity(number_of_questions.min(16) as usize);
        for i in 0..number_of_questions {
            questions.push(DnsQuestion::read_from(&mut reader).with_context(|| format!("question {}", i))?);
        }

        let answers = read_records(&mut reader, number_of_answers, "answer")?;
        let authority_records = read_records(&mut reader, number_of_authority_records, "authority")?;

        let mut additional_records = Vec::new();
        let mut edns: Option<Edns> = None;

        for i in 0..number_of_additional_records {
            let start = reader.position();
            reader.read_qname()?;

            if RecordType::from(reader.peek_u16()?) == RecordType::OPT {
                ensure!(edns.is_none(), "more than one OPT record in message");
                reader.read_u16()?;
                edns = Some(Edns::read_from(&mut reader)?);
            } else {
                reader.seek(start)?;
                additional_records
                    .push(DnsRecord::read_from(&mut reader).with_context(|| format!("additional record {}", i))?);
            }
        }

        Ok(Self {
            id,
            flags,
            questions,
            answers,
            authority_records,
            additional_records,
            edns,
        })
    }

    /// Encode the message with no size limit beyond the protocol maximum.
    pub fn encode(&self) -> anyhow::Result<Bytes> {
        self.encode_with_max(MAX_MESSAGE_SIZE)
    }

    /// Encode the message, failing if it would exceed `max_len` bytes.
    pub fn encode_with_max(&self, max_len: usize) -> anyhow::Result<Bytes> {
        let mut writer = DnsMessageWriter::new_with_max(max_len);

        writer.write_u16(self.id)?;
        self.flags.write_to(&mut writer)?;

        let additional_count = self.additional_records.len() + usize::from(self.edns.is_some());

        writer.write_u16(section_count(self.questions.len())?)?; // QDCOUNT
        writer.write_u16(section_count(self.answers.len())?)?; // ANCOUNT
        writer.write_u16(section_count(self.authority_records.len())?)?; // NSCOUNT
        writer.write_u16(section_count(additional_count)?)?; // ARCOUNT

        for question in &self.questions {
            question.write_to(&mut writer)?;
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority_records)
            .chain(&self.additional_records)
        {
            record.write_to(&mut writer)?;
        }

        if let Some(edns) = &self.edns {
            edns.write_to(&mut writer)?;
        }

        Ok(writer.into_bytes())
    }

    /// A copy of this message reduced to header and questions with the TC bit set.
    pub fn truncated(&self) -> Self {
        let mut flags = self.flags;
        flags.truncated = true;

        Self {
            id: self.id,
            flags,
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority_records: Vec::new(),
            additional_records: Vec::new(),
            edns: self.edns.clone(),
        }
    }

    /// Questions
    pub fn questions(&self) -> &[DnsQuestion] {
        &self.questions
    }

    /// Answers
    pub fn answers(&self) -> &[DnsRecord] {
        &self.answers
    }

    /// Authority records
    pub fn authority_records(&self) -> &[DnsRecord] {
        &self.authority_records
    }

    /// Additional records, without the OPT pseudo-record.
    pub fn additional_records(&self) -> &[DnsRecord] {
        &self.additional_records
    }

    /// EDNS
    pub fn edns(&self) -> Option<&Edns> {
        self.edns.as_ref()
    }

    pub fn set_edns(&mut self, edns: Option<Edns>) {
        self.edns = edns;
    }

    /// Take the record sections out of the message, leaving them empty.
    pub fn take_sections(&mut self) -> (Vec<DnsRecord>, Vec<DnsRecord>, Vec<DnsRecord>) {
        (
            std::mem::take(&mut self.answers),
            std::mem::take(&mut self.authority_records),
            std::mem::take(&mut self.additional_records),
        )
    }

    /// Set the response code. Codes above 15 need the EDNS extended rcode bits.
    pub fn set_response_code(&mut self, response_code: DnsResponseCode) {
        let full = response_code.to_u16();
        self.flags.rcode_low = (full & 0x0F) as u8;

        if full > 0x0F {
            let edns = self.edns.get_or_insert_with(Edns::default);
            edns.extended_rcode = (full >> 4) as u8;
        } else if let Some(edns) = self.edns.as_mut() {
            edns.extended_rcode = 0;
        }
    }

    /// Response code
    pub fn response_code(&self) -> DnsResponseCode {
        let low = self.flags.rcode_low as u16;
        let high = self.edns.as_ref().map(|e| e.extended_rcode).unwrap_or(0) as u16;
        DnsResponseCode::from((high << 4) | low)
    }
}

fn read_records(reader: &mut DnsMessageReader, count: u16, section: &str) -> anyhow::Result<Vec<DnsRecord>> {
    let mut records = Vec::with_capacity(count.min(64) as usize);
    for i in 0..count {
        records.push(DnsRecord::read_from(reader).with_context(|| format!("{} record {}", section, i))?);
    }
    Ok(records)
}

fn section_count(len: usize) -> anyhow::Result<u16> {
    u16::try_from(len).map_err(|_| anyhow::anyhow!("too many records in section: {}", len))
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DnsFlags {
    /// Query or Response
    pub response: bool,
    /// Opcode
    pub opcode: DnsOpcode,
    /// Authoritative Answer
    pub authorative_answer: bool,
    /// Truncated, the message did not fit the transport
    pub truncated: bool,
    /// Recursion Desired
    pub recursion_desired: bool,
    /// Recursion Available
    pub recursion_available: bool,
    /// Z flag, reserved, must be zero
    pub(crate) z: bool,
    /// Authentic Data
    pub authentic_data: bool,
    /// Checking Disabled
    pub checking_disabled: bool,
    // Lower part of the response code.
    pub(crate) rcode_low: u8,
}

impl DnsFlags {
    pub fn from_u16(bits: u16) -> anyhow::Result<Self> {
        let opcode = ((bits >> 11) & 0xF) as u8;
        Ok(Self {
            response: (bits >> 15) & 0x1 != 0,
            opcode: DnsOpcode::try_from(opcode).map_err(|_| anyhow::anyhow!("unsupported opcode {}", opcode))?,
            authorative_answer: (bits >> 10) & 0x1 != 0,
            truncated: (bits >> 9) & 0x1 != 0,
            recursion_desired: (bits >> 8) & 0x1 != 0,
            recursion_available: (bits >> 7) & 0x1 != 0,
            z: (bits >> 6) & 0x1 != 0,
            authentic_data: (bits >> 5) & 0x1 != 0,
            checking_disabled: (bits >> 4) & 0x1 != 0,
            rcode_low: (bits & 0x0F) as u8,
        })
    }

    pub fn to_u16(&self) -> u16 {
        let opcode: u8 = self.opcode.into();
        ((self.response as u16) << 15)
            | ((opcode as u16) << 11)
            | ((self.authorative_answer as u16) << 10)
            | ((self.truncated as u16) << 9)
            | ((self.recursion_desired as u16) << 8)
            | ((self.recursion_available as u16) << 7)
            | ((self.z as u16) << 6)
            | ((self.authentic_data as u16) << 5)
            | ((self.checking_disabled as u16) << 4)
            | (self.rcode_low & 0x0F) as u16
    }
}

impl DnsReadable for DnsFlags {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        Self::from_u16(reader.read_u16()?)
    }
}

impl DnsWritable for DnsFlags {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_u16(self.to_u16())
    }
}

crate::u16_enum_with_unknown! {
    /// Dns response code
    ///
    /// Based on: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6
    #[derive(Default)]
    pub enum DnsResponseCode {
        /// No error, the request was successful
        #[default]
        NoError = 0,
        /// Format error, the request was malformed
        FormatError = 1,
        /// Server failure, the server encountered an error while processing the request
        ServerFailure = 2,
        /// Non-existent domain, the requested domain does not exist
        NxDomain = 3,
        /// Not Implemented
        NotImp = 4,
        /// Query refused
        Refused = 5,
        /// Name Exists when it should not
        YXDomain = 6,
        /// RR Set Exists when it should not
        YXRRSet = 7,
        /// RR Set that should exist does not
        NXRRSet = 8,
        /// Server Not Authoritative for zone
        NotAuth = 9,
        /// Name not contained in zone
        NotZone = 10,
        /// DSO-TYPE Not Implemented
        DSOTYPENI = 11,
        /// Bad OPT Version
        BADVERS = 16,
        /// Key not recognized
        BADKEY = 17,
        /// Signature out of time window
        BADTIME = 18,
        /// Bad TKEY Mode
        BADMODE = 19,
        /// Duplicate key name
        BADNAME = 20,
        /// Algorithm not supported
        BADALG = 21,
        /// Bad Truncation
        BADTRUNC = 22,
        /// Bad/missing Server Cookie
        BADCOOKIE = 23,
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DnsOpcode {
    /// Standard query
    #[default]
    Query = 0,
    /// Inverse query, obsolete
    IQuery = 1,
    /// Server status request
    Status = 2,
    /// Zone change notification
    Notify = 4,
    /// Dynamic update
    Update = 5,
    /// DNS stateful operations
    Dso = 6,
}

/// Represents a DNS question in a DNS message.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsQuestion {
    /// The domain name being queried
    pub qname: DomainName,
    /// The type of the query (e.g., A, AAAA, CNAME)
    pub qtype: RecordType,
    /// The class of the query (e.g., IN for Internet)
    pub qclass: ClassType,
}

impl DnsQuestion {
    pub fn new(qname: DomainName, qtype: RecordType, qclass: ClassType) -> Self {
        Self { qname, qtype, qclass }
    }
}

impl DnsReadable for DnsQuestion {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let qname = reader.read_qname()?;
        let qtype = RecordType::from(reader.read_u16()?);
        let qclass = ClassType::from(reader.read_u16()?);

        Ok(Self { qname, qtype, qclass })
    }
}

impl DnsWritable for DnsQuestion {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_qname(&self.qname)?;
        writer.write_u16(self.qtype.to_u16())?;
        writer.write_u16(self.qclass.to_u16())?;
        Ok(())
    }
}

crate::u16_enum_with_unknown! {
    /// DNS record types.
    ///
    /// Based on: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
    pub enum RecordType {
        /// IPv4
        A = 1,
        /// Name server
        NS = 2,
        /// Canonical name
        CNAME = 5,
        /// Start of authority
        SOA = 6,
        /// Pointer (for reverse DNS)
        PTR = 12,
        /// Host information
        HINFO = 13,
        /// Mail exchange
        MX = 15,
        /// Text strings
        TXT = 16,
        /// IPv6
        AAAA = 28,
        /// Service locator
        SRV = 33,
        /// Naming Authority Pointer
        NAPTR = 35,
        /// DNAME
        DNAME = 39,
        /// OPT, only used by additional records (EDNS)
        OPT = 41,
        /// Delegation Signer
        DS = 43,
        /// RRSIG
        RRSIG = 46,
        /// NSEC
        NSEC = 47,
        /// DNS KEY
        DNSKEY = 48,
        /// NSEC3
        NSEC3 = 50,
        /// TLSA
        TLSA = 52,
        /// General-purpose service binding
        SVCB = 64,
        /// SVCB-compatible type for use with HTTP
        HTTPS = 65,
        /// SPF
        SPF = 99,
        /// Incremental transfer
        IXFR = 251,
        /// Transfer of an entire zone
        AXFR = 252,
        /// All records
        ANY = 255,
        /// Certification Authority Restriction
        CAA = 257,
    }
}

crate::u16_enum_with_unknown! {
    /// DNS class types.
    pub enum ClassType {
        /// Internet
        IN = 1,
        /// Chaosnet
        CH = 3,
        /// Hesiod (MIT Athena)
        HS = 4,
        /// None, used by dynamic update
        NONE = 254,
        /// Any
        ANY = 255,
    }
}

/// Associated data for a DNS record.
///
/// Types without a structured variant are carried as raw rdata so they can be
/// relayed unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecordData {
    Raw(Vec<u8>),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    DomainName(DomainName),
    SOA {
        /// Primary nameserver.
        mname: DomainName,
        /// Contact email
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        priority: u16,
        host: DomainName,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
}

impl DnsRecordData {
    /// Write the record data to the DNS message.
    pub fn write(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        match self {
            DnsRecordData::Raw(data) => writer.write_bytes(data),
            DnsRecordData::Ipv4(addr) => writer.write_bytes(&addr.octets()),
            DnsRecordData::Ipv6(addr) => writer.write_bytes(&addr.octets()),
            DnsRecordData::DomainName(name) => writer.write_qname(name),
            DnsRecordData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.write_qname(mname)?;
                writer.write_qname(rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    writer.write_u32(*value)?;
                }
                Ok(())
            }
            DnsRecordData::MX { priority, host } => {
                writer.write_u16(*priority)?;
                writer.write_qname(host)
            }
            DnsRecordData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_u16(*priority)?;
                writer.write_u16(*weight)?;
                writer.write_u16(*port)?;
                writer.write_qname(target)
            }
        }
    }

    /// Decode record data based on the provided `record_type`.
    ///
    /// Exactly `data_length` bytes must be consumed.
    pub fn read_from_record_type(
        reader: &mut DnsMessageReader,
        record_type: RecordType,
        data_length: usize,
    ) -> anyhow::Result<DnsRecordData> {
        let start = reader.position();

        let data = match record_type {
            RecordType::CNAME | RecordType::PTR | RecordType::NS | RecordType::DNAME => {
                DnsRecordData::DomainName(reader.read_qname()?)
            }
            RecordType::A => {
                ensure!(data_length == 4, "A record with {} bytes of rdata", data_length);
                let raw = reader.read_bytes(4)?;
                DnsRecordData::Ipv4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
            }
            RecordType::AAAA => {
                ensure!(data_length == 16, "AAAA record with {} bytes of rdata", data_length);
                let raw: [u8; 16] = reader.read_bytes(16)?.try_into()?;
                DnsRecordData::Ipv6(Ipv6Addr::from(raw))
            }
            RecordType::SOA => DnsRecordData::SOA {
                mname: reader.read_qname()?,
                rname: reader.read_qname()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            RecordType::MX => DnsRecordData::MX {
                priority: reader.read_u16()?,
                host: reader.read_qname()?,
            },
            RecordType::SRV => DnsRecordData::SRV {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: reader.read_qname()?,
            },
            _ => DnsRecordData::Raw(reader.read_bytes(data_length)?.to_vec()),
        };

        let consumed = reader.position() - start;
        ensure!(
            consumed == data_length,
            "rdata length mismatch for {}: declared {} bytes, consumed {}",
            record_type,
            data_length,
            consumed
        );

        Ok(data)
    }
}

/// Represents a resource record in a DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: DomainName,
    pub record_type: RecordType,
    pub class: ClassType,
    pub ttl: u32,
    pub data: DnsRecordData,
}

impl DnsRecord {
    pub fn new(name: DomainName, record_type: RecordType, class: ClassType, ttl: u32, data: DnsRecordData) -> Self {
        Self {
            name,
            record_type,
            class,
            ttl,
            data,
        }
    }
}

impl DnsReadable for DnsRecord {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let name = reader.read_qname()?;
        let record_type = RecordType::from(reader.read_u16()?);
        let class = ClassType::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let data_length = reader.read_u16()? as usize;

        let data = DnsRecordData::read_from_record_type(reader, record_type, data_length)?;

        Ok(Self {
            name,
            record_type,
            class,
            ttl,
            data,
        })
    }
}

impl DnsWritable for DnsRecord {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_qname(&self.name)?;
        writer.write_u16(self.record_type.to_u16())?;
        writer.write_u16(self.class.to_u16())?;
        writer.write_u32(self.ttl)?;
        write_rdata(writer, |w| self.data.write(w))
    }
}

/// Reserve RDLENGTH, run `body`, then backfill the length.
fn write_rdata(
    writer: &mut DnsMessageWriter,
    body: impl FnOnce(&mut DnsMessageWriter) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let rdlen_pos = writer.position();
    writer.write_u16(0)?;

    let before = writer.position();
    body(writer)?;
    let rdlen = u16::try_from(writer.position() - before).context("rdata longer than 65535 bytes")?;

    writer.overwrite_bytes(rdlen_pos, &rdlen.to_be_bytes())
}

/// EDNS (Extension Mechanisms for DNS) information carried by the OPT record.
#[derive(Debug, Clone, PartialEq)]
pub struct Edns {
    /// Max UDP payload size sender can handle
    pub udp_payload_size: u16,
    /// High bits of RCODE (ttl[31:24])
    extended_rcode: u8,
    /// EDNS version
    pub version: u8,
    /// Z flags
    z_flags: u16,
    /// Options, kept opaque.
    pub options: Vec<EdnsOption>,
}

impl Default for Edns {
    fn default() -> Self {
        Self {
            udp_payload_size: 1232,
            extended_rcode: 0,
            version: 0,
            z_flags: 0,
            options: vec![],
        }
    }
}

impl DnsReadable for Edns {
    /// Reads the OPT record body, positioned right after its TYPE field.
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let udp_payload_size = reader.read_u16()?;

        // TTL packed: ext_rcode | version | z_flags
        let ttl = reader.read_u32()?;

        let rdlen = reader.read_u16()? as usize;
        let opts_end = reader.position() + rdlen;
        ensure!(rdlen <= reader.remaining(), "OPT rdata overruns message");

        let mut options = Vec::new();
        while reader.position() < opts_end {
            let option = EdnsOption::read_from(reader)?;
            ensure!(reader.position() <= opts_end, "EDNS option overruns OPT rdata");
            options.push(option);
        }

        Ok(Self {
            udp_payload_size,
            extended_rcode: ((ttl >> 24) & 0xFF) as u8,
            version: ((ttl >> 16) & 0xFF) as u8,
            z_flags: (ttl & 0xFFFF) as u16,
            options,
        })
    }
}

impl DnsWritable for Edns {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_u8(0)?; // root owner name
        writer.write_u16(RecordType::OPT.to_u16())?;
        writer.write_u16(self.udp_payload_size)?;
        writer.write_u32(((self.extended_rcode as u32) << 24) | ((self.version as u32) << 16) | self.z_flags as u32)?;
        write_rdata(writer, |w| {
            for option in &self.options {
                option.write_to(w)?;
            }
            Ok(())
        })
    }
}

/// EDNS option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl DnsReadable for EdnsOption {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let code = reader.read_u16()?;
        let len = reader.read_u16()? as usize;
        let data = reader.read_bytes(len)?.to_vec();
        Ok(Self { code, data })
    }
}

impl DnsWritable for EdnsOption {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        let len = u16::try_from(self.data.len()).context("EDNS option too long")?;
        writer.write_u16(self.code)?;
        writer.write_u16(len)?;
        writer.write_bytes(&self.data)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod message_tests;
