//! # Protocol Vocabulary
//!
//! Purpose: Name every command and option keyword the client emits as an
//! immutable byte constant, so request builders never spell protocol tokens
//! by hand.
//!
//! ## Design Principles
//! 1. **Closed Enumeration**: Commands and keywords are plain `Copy` enums.
//! 2. **Constant Table**: Each variant maps to a `&'static [u8]` with no
//!    allocation and no reflection.
//! 3. **Case-Insensitive Lookup**: `from_bytes` accepts any ASCII casing,
//!    matching how RESP servers treat command names.

use std::fmt;

macro_rules! protocol_tokens {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $token:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every token in declaration order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Returns the wire bytes for this token.
            pub const fn as_bytes(self) -> &'static [u8] {
                match self {
                    $( $name::$variant => $token as &'static [u8], )+
                }
            }

            /// Looks up a token by its wire bytes, ignoring ASCII case.
            pub fn from_bytes(raw: &[u8]) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|token| token.as_bytes().eq_ignore_ascii_case(raw))
            }

            /// Returns the token as text for logs and error messages.
            pub fn name(self) -> &'static str {
                // Tokens are ASCII literals.
                std::str::from_utf8(self.as_bytes()).unwrap_or("?")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.as_bytes()
            }
        }
    };
}

protocol_tokens! {
    /// Command names understood by the client.
    ///
    /// The first token of every request is one of these.
    pub enum CommandName {
        // keys
        Del => b"DEL",
        Exists => b"EXISTS",
        Expire => b"EXPIRE",
        ExpireAt => b"EXPIREAT",
        PExpire => b"PEXPIRE",
        PExpireAt => b"PEXPIREAT",
        Persist => b"PERSIST",
        Ttl => b"TTL",
        PTtl => b"PTTL",
        Keys => b"KEYS",
        RandomKey => b"RANDOMKEY",
        Rename => b"RENAME",
        RenameNx => b"RENAMENX",
        Type => b"TYPE",
        Dump => b"DUMP",
        Restore => b"RESTORE",
        Move => b"MOVE",
        Migrate => b"MIGRATE",
        Scan => b"SCAN",
        // strings
        Get => b"GET",
        Set => b"SET",
        Incr => b"INCR",
        IncrBy => b"INCRBY",
        Append => b"APPEND",
        Ping => b"PING",
        // sets
        SAdd => b"SADD",
        SCard => b"SCARD",
        SIsMember => b"SISMEMBER",
        SMembers => b"SMEMBERS",
        SRandMember => b"SRANDMEMBER",
        SRem => b"SREM",
        SMove => b"SMOVE",
        SPop => b"SPOP",
        SDiff => b"SDIFF",
        SDiffStore => b"SDIFFSTORE",
        SInter => b"SINTER",
        SInterStore => b"SINTERSTORE",
        SUnion => b"SUNION",
        SUnionStore => b"SUNIONSTORE",
        SScan => b"SSCAN",
        // hashes
        HSet => b"HSET",
        HGet => b"HGET",
        HExists => b"HEXISTS",
        HSetNx => b"HSETNX",
        HMGet => b"HMGET",
        HMSet => b"HMSET",
        HLen => b"HLEN",
        HGetAll => b"HGETALL",
        HKeys => b"HKEYS",
        HVals => b"HVALS",
        HDel => b"HDEL",
        HIncrBy => b"HINCRBY",
        HIncrByFloat => b"HINCRBYFLOAT",
        HScan => b"HSCAN",
    }
}

protocol_tokens! {
    /// Option keywords that appear after the command name.
    pub enum Keyword {
        Alpha => b"ALPHA",
        Asc => b"ASC",
        By => b"BY",
        Count => b"COUNT",
        Desc => b"DESC",
        Ex => b"EX",
        Exists => b"EXISTS",
        Flush => b"FLUSH",
        Get => b"GET",
        GetName => b"GETNAME",
        Kill => b"KILL",
        Limit => b"LIMIT",
        List => b"LIST",
        Load => b"LOAD",
        Match => b"MATCH",
        Nx => b"NX",
        Px => b"PX",
        Replace => b"REPLACE",
        ResetStat => b"RESETSTAT",
        Rewrite => b"REWRITE",
        Set => b"SET",
        SetName => b"SETNAME",
        Store => b"STORE",
        WithScores => b"WITHSCORES",
        Xx => b"XX",
    }
}

impl CommandName {
    /// Check if the command only reads data.
    pub fn is_readonly(self) -> bool {
        !self.is_write()
    }

    /// Check if the command may modify the keyspace.
    pub fn is_write(self) -> bool {
        use CommandName::*;
        matches!(
            self,
            Del | Expire
                | ExpireAt
                | PExpire
                | PExpireAt
                | Persist
                | Rename
                | RenameNx
                | Restore
                | Move
                | Migrate
                | Set
                | Incr
                | IncrBy
                | Append
                | SAdd
                | SRem
                | SMove
                | SPop
                | SDiffStore
                | SInterStore
                | SUnionStore
                | HSet
                | HSetNx
                | HMSet
                | HDel
                | HIncrBy
                | HIncrByFloat
        )
    }

    /// Check if the command belongs to the cursor-based SCAN family.
    pub fn is_scan(self) -> bool {
        matches!(self, CommandName::Scan | CommandName::SScan | CommandName::HScan)
    }
}
