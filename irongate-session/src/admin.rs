/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Typed views over administrative messages.
//!
//! Each admin message is decoded into a stack-allocated tagged variant
//! borrowing from the original buffer; the session then dispatches with an
//! exhaustive match instead of re-scanning fields per handler.

use irongate_core::error::DecodeError;
use irongate_core::field::tags;
use irongate_core::message::{MsgType, RawMessage};

/// Decoded fields of a Logon (35=A).
#[derive(Debug, Clone, Copy)]
pub struct LogonView<'a> {
    /// HeartBtInt (tag 108) in seconds.
    pub heart_bt_int_secs: u64,
    /// ResetSeqNumFlag (tag 141).
    pub reset_seq_num: bool,
    /// Username (tag 553), if present.
    pub username: Option<&'a str>,
    /// Password (tag 554), if present.
    pub password: Option<&'a str>,
}

/// A decoded administrative message.
#[derive(Debug, Clone, Copy)]
pub enum AdminMessage<'a> {
    /// Logon (35=A).
    Logon(LogonView<'a>),
    /// Heartbeat (35=0), optionally echoing a TestReqID.
    Heartbeat {
        /// TestReqID (tag 112) being answered, if any.
        test_req_id: Option<&'a str>,
    },
    /// TestRequest (35=1).
    TestRequest {
        /// TestReqID (tag 112) to echo in the Heartbeat reply.
        test_req_id: &'a str,
    },
    /// ResendRequest (35=2).
    ResendRequest {
        /// BeginSeqNo (tag 7), inclusive.
        begin_seq_no: u64,
        /// EndSeqNo (tag 16), inclusive; 0 means "through current".
        end_seq_no: u64,
    },
    /// SequenceReset (35=4), in gap-fill or reset mode.
    SequenceReset {
        /// GapFillFlag (tag 123).
        gap_fill: bool,
        /// NewSeqNo (tag 36): the next sequence number the peer will use.
        new_seq_no: u64,
    },
    /// Logout (35=5).
    Logout {
        /// Text (tag 58), if present.
        text: Option<&'a str>,
    },
    /// Reject (35=3). Logged and consumed.
    Reject,
}

impl<'a> AdminMessage<'a> {
    /// Decodes an administrative message view from a parsed message.
    ///
    /// # Returns
    /// `Ok(None)` for application messages.
    ///
    /// # Errors
    /// Returns `DecodeError` if a required type-specific field is missing or
    /// malformed.
    pub fn decode(message: &RawMessage<'a>) -> Result<Option<Self>, DecodeError> {
        let admin = match message.msg_type() {
            MsgType::Logon => Self::Logon(LogonView {
                heart_bt_int_secs: message.get_field_as(tags::HEART_BT_INT)?,
                reset_seq_num: message
                    .get_field(tags::RESET_SEQ_NUM_FLAG)
                    .is_some_and(|f| f.is_flag_set()),
                username: message.get_field_str(tags::USERNAME),
                password: message.get_field_str(tags::PASSWORD),
            }),
            MsgType::Heartbeat => Self::Heartbeat {
                test_req_id: message.get_field_str(tags::TEST_REQ_ID),
            },
            MsgType::TestRequest => Self::TestRequest {
                test_req_id: message
                    .get_field_str(tags::TEST_REQ_ID)
                    .ok_or(DecodeError::MissingRequiredField {
                        tag: tags::TEST_REQ_ID,
                    })?,
            },
            MsgType::ResendRequest => Self::ResendRequest {
                begin_seq_no: message.get_field_as(tags::BEGIN_SEQ_NO)?,
                end_seq_no: message.get_field_as(tags::END_SEQ_NO)?,
            },
            MsgType::SequenceReset => Self::SequenceReset {
                gap_fill: message
                    .get_field(tags::GAP_FILL_FLAG)
                    .is_some_and(|f| f.is_flag_set()),
                new_seq_no: message.get_field_as(tags::NEW_SEQ_NO)?,
            },
            MsgType::Logout => Self::Logout {
                text: message.get_field_str(tags::TEXT),
            },
            MsgType::Reject => Self::Reject,
            _ => return Ok(None),
        };

        Ok(Some(admin))
    }
}
