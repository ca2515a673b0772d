//! Fixtures shared by the unit tests.

use crate::config::Clock;
use crate::error::{KeyError, RepositoryError};
use crate::key::{KeyChain, KeyFetcher, KeySet};
use crate::registration::{Party, Platform, Registration, RegistrationRepository, Tool};
use chrono::{DateTime, Duration, Utc};
use jsonwebkey as jwk;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// Generated using https://mkjwk.org/
pub const PUB_JWK: &str = r#"{
    "kty": "RSA",
    "e": "AQAB",
    "use": "sig",
    "kid": "r50vKukJl4oVaT78O0ELIGS4w8ynMY_4lRSBq-uvTX4",
    "alg": "RS256",
    "n": "rJGYlYJPZZmeZUyxtEdbbzyMZrBbJPMbhkaioazk6_43d9SIYcVWouei6R5WXQrO6chx3HaSUOqRcYv4oF9x6FVrBWSGyxbzjltcnwKOWn3K8qmJWQvv2nLvLJvf_wdUR2IlH2SfGEE9Om6mJG6tw4Hvn0FauCvnS_a5E5oi0-Mp8rDK3KaHKTr7YHPNzKZzYryF8Ids2mb7PULxFNErIUmB6yTuxUjmbLXwRK2nHe2gHnaepYqcTZIQcTgfS8NeAqKUHWwRkvqmi_pIr9g8azwCqQ8cHpaOoxyUtTlSva1ggkiinJdeIP1-RF-ElflqGtqLXF9OJc8Kcd1ivIaEaQ"
}"#;

pub const PRIVATE_JWK: &str = r#"{
    "p": "9WRlEysjzbea25MPFvMMioGvShW4vZD0Qhhc4yVRZz0PpRXpW5wVQKMJqd1N7vfiXA_OMtGY3pTMegUhF_Mw7W2S1b0_2V_xAXYt8g4G0IY0aT9GBETB63ga4FLccJCSkjIagtt5TOhO5IOIDboghEKkQvguNTSJPi3J5Dvp_PM",
    "kty": "RSA",
    "q": "tAdPC8Yo08Cb951vkfWmjZyJuosjRHcWugvrVivnuWVyHouuX9ktbE-JRREhQ7o-58EXJZJ_el07_IE1xKoKlaJ3saEOfWDOApDiJxbbwwnMGCTqdsi8Q07DN4PgYFcSr5MXd9ZFemqVBXW84yFKVXPNKXfR_VoI9GlURQU6YDM",
    "d": "J_qnHeQNnt0jDBbjiH-LmE6vvE6ZHwtPUiFlJg2XD3FaymEro3MDakQ9wsIrgeyyGQk-D7RMm4BsZ6Dk3cqe6hN38sziSYSssktKPvBpqF9COEu8rSuNys8bx_rovv2ksdD0BrzZ-tWKaNIfnYsiqIuexwduDALn1_p10CvCa9HvY9Z_wcuW4hazdMDXZhQIDexldd6hpdB4XgIftqmvrMV7uTCENcLrZ_daJO_dKugybin828asAjXzua2sNCD3QYKmWVR65p-4PBDBKPFWyEuV3C2zpPE_rBex-B1iOwKwlF_-UPMSpPbaGzgyB2Nl4k1UQ7CZBMWswFnS6FnJ_Q",
    "e": "AQAB",
    "use": "sig",
    "kid": "r50vKukJl4oVaT78O0ELIGS4w8ynMY_4lRSBq-uvTX4",
    "qi": "7-uVCCf2T6nQcp4_jHt1YA6hb9anJY5NjA-kPtm4OcbUKQD5i3XoM7Gu3vMgw0fYdLigDa4Nt6qmpOK-On0S74fJdL4iR_8dsq6ytO1Q3Sl7xkvZmNRiQV2lr-DNLR5Wl8UCeoDmKzF8u3Y1riUkr9sk-mrLTWqMSK_r2Th5NKc",
    "dp": "62Ix0gE_hsTntleJ0emxzeo3ykirvKqeogfckcXqH61ipGgwP7-oYygAzP-LEf6VEtnWYMjMajUxLppc9CxCcnz4rC2sYUa2V0CVMepifwM8ovgeoVmS6dt7bFIPQapr7fBBneQIpszvYCMLDp_LMRL7nYGSUVbjjtE9J8CQ4iE",
    "alg": "RS256",
    "dq": "PnMimoT8-Keh8v1sDIfYZNtec5V8gG2HNraXxmaolYl5UttFe_5MYXwdtBXDIkljNOWob-In0nyxKGByFGygC1Q2jSm_awK_s-gqa0Dkrv2hDOcRZm8vz3FtCr72gLTzyHAP_gQYSeTbGO_EvE16CbaH_tCPyYEIBjDbiK3NmD0",
    "n": "rJGYlYJPZZmeZUyxtEdbbzyMZrBbJPMbhkaioazk6_43d9SIYcVWouei6R5WXQrO6chx3HaSUOqRcYv4oF9x6FVrBWSGyxbzjltcnwKOWn3K8qmJWQvv2nLvLJvf_wdUR2IlH2SfGEE9Om6mJG6tw4Hvn0FauCvnS_a5E5oi0-Mp8rDK3KaHKTr7YHPNzKZzYryF8Ids2mb7PULxFNErIUmB6yTuxUjmbLXwRK2nHe2gHnaepYqcTZIQcTgfS8NeAqKUHWwRkvqmi_pIr9g8azwCqQ8cHpaOoxyUtTlSva1ggkiinJdeIP1-RF-ElflqGtqLXF9OJc8Kcd1ivIaEaQ"
}"#;

pub const PLATFORM_PUB_JWK: &str = r#"{
    "kty": "RSA",
    "e": "AQAB",
    "use": "sig",
    "alg": "RS256",
    "n": "qZd2R-vWaMyAyghVEyrBEr7_R5zbry_XvIzjZA5sKSlAU1AbuEXdpQfjUvJKwgLEZUS5nToy2fxTUsiiGpAVeE11955ZdEjGxzHGS9IP_tGvBJ4TPbeSpeQ_0OA6Grfuj5gb4pbeWHRcbSutfmQHKwqE6-HN2WvhAMJC9e86Ljgg0L1oDO2XZOAEOUE6RvQuKctUcqGRwyu-6tf9Co4muAonVUn2Qo5M680f1KF0xSAuAJfKroDoKgsbHC6PasYG40CRogDRECyuWESGA1NVPjYVUmWIlRFQZF3icPdJ2kz_PGmU_d4vROSHqoNW34oasSmTwKlmwW6EPdrOcd5IoQ"
}"#;

pub const PLATFORM_PRIVATE_JWK: &str = r#"{
    "kty": "RSA",
    "e": "AQAB",
    "use": "sig",
    "alg": "RS256",
    "n": "qZd2R-vWaMyAyghVEyrBEr7_R5zbry_XvIzjZA5sKSlAU1AbuEXdpQfjUvJKwgLEZUS5nToy2fxTUsiiGpAVeE11955ZdEjGxzHGS9IP_tGvBJ4TPbeSpeQ_0OA6Grfuj5gb4pbeWHRcbSutfmQHKwqE6-HN2WvhAMJC9e86Ljgg0L1oDO2XZOAEOUE6RvQuKctUcqGRwyu-6tf9Co4muAonVUn2Qo5M680f1KF0xSAuAJfKroDoKgsbHC6PasYG40CRogDRECyuWESGA1NVPjYVUmWIlRFQZF3icPdJ2kz_PGmU_d4vROSHqoNW34oasSmTwKlmwW6EPdrOcd5IoQ",
    "d": "HvhJ4VhwDzNJUZuz7YwhNgsrEyjR9WwHOaeA3wTDO8EMvioi5cPcdga6vKsCe-uFcfja7Jt0LdqmXLfG4pLtWMrMgCuqqlGf-0BbtfzmbuJb07wKR3r-jMzh2oMYGUj9h7t_XCGw-PZG6qjPRgV-SZ3iKDFUJiBNNpZDJCZLuaS5k_Bf-LQ2mJNatAAZs96T-j7vuJz2wIW-YyJhJ_Ax7qgGmV3-AqXr640GM405ZbmSGkBdHWjMUhRCw5Q10Kw_LtnwRJrb5UPkdoRTZrug12TL1RFvG3r7_YWbLN685yHwzCkqrvL1lKI-Niaenr8S5IMK6dcXbU0gy6it_3nl",
    "p": "7eaa0oEem1QaWDNReMOaNs2UU-w8P3OGDD4-LpfleRuZ64RQaEONfv9KARyq8-7P1wr_2j46c2mzHCYNMUjMEt1JmXUvnGgEfRnWio6zTA45o-iE3LpskNkGG5WczyDG-HF7E-7VA5Wl8WuYn2B6v4To-ASz5XYrAgSWQreo2kU",
    "q": "tn50-1da-mxH_1-3VZ7lb0zAXypnC9y6QYsLVyAmEkGHvHiTv_NIXUsffSqKwtPayCk4S4YNb2KOTzi4GOUDMmq7b_4Io4q6dy5_kR9tOLHrQv_W_8U1W8TOWaCeCPk0vp6Rm-wtWhFNPhvniNYKL_kheeslZHONId1X2OaIKK0",
    "dp": "WWsY_FBN6cI12LsJP2P9_eVNgDHF_29zjfyDMM4lEV0_gFeORXJGp9pavYpB80fq1QAsZKKJI8Ix8T2YLdMX6WtFc6mpSJeMQF1K12-Fkuux3JrT_YcQsWzxL8MPWocOYml9AmP9qsg_xDtV9Wm1GXFig355A6FjzvFcbR1NGSU",
    "dq": "Rn9hZ3refWD5CzEJnLzOOwm2Qs0Zk56IISu6jMSxkFnaOreFtCAiM1AC8RJPGmZG3Q33Xk2BwSacfQQXMh699mr-z4ueALdlwwamZwRx5_XrQS2d-55ON442fK8sfaDvfDe7XjWFa4bFhRm4fsbYlqGyCewJvN1ahtt_xR2BOd0",
    "qi": "6X8ZmNSy1a4BghJcpdVlPdieplT6R_iEVHKQPxmEYcBqfyUd0x3w5CxGa_5twCqscnPYU26qpQsvD_S-hN7jbxLUj5FGklD3paxWUicgHAamF8fLky2lCypvMDaNHQYqzsNye1id8Wuy0SAXcXsmPy95-McN0N11KQtJyGoaEbI"
}"#;

pub fn tool_key_chain() -> KeyChain {
    KeyChain::from_jwk("toolKeyChain", "toolKeySet", PUB_JWK, Some(PRIVATE_JWK)).unwrap()
}

pub fn platform_key_chain() -> KeyChain {
    KeyChain::from_jwk(
        "platformKeyChain",
        "platformKeySet",
        PLATFORM_PUB_JWK,
        Some(PLATFORM_PRIVATE_JWK),
    )
    .unwrap()
}

pub fn registration_without_keys() -> Registration {
    Registration::new(
        "registrationIdentifier",
        "registrationClientId",
        Platform {
            identifier: "platformIdentifier".to_owned(),
            name: "platformName".to_owned(),
            audience: "platformAudience".to_owned(),
            oidc_authentication_url: "http://platform.com/oidc-auth".to_owned(),
        },
        Tool {
            identifier: "toolIdentifier".to_owned(),
            name: "toolName".to_owned(),
            audience: "toolAudience".to_owned(),
            oidc_initiation_url: "http://tool.com/oidc-init".to_owned(),
            launch_url: Some("http://tool.com/launch".to_owned()),
        },
        vec!["deploymentIdentifier".to_owned()],
    )
}

pub fn registration() -> Registration {
    registration_without_keys()
        .with_key_chain(Party::Platform, platform_key_chain())
        .with_key_chain(Party::Tool, tool_key_chain())
}

/// Clock standing still until told to move.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        FixedClock(Mutex::new(now))
    }

    pub fn advance(&self, seconds: i64) {
        *self.0.lock().unwrap() += Duration::seconds(seconds);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Serves the key set of both test key chains and counts fetches.
#[derive(Default)]
pub struct RecordingKeyFetcher {
    calls: AtomicUsize,
}

impl RecordingKeyFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeyFetcher for RecordingKeyFetcher {
    fn fetch_key(&self, jwks_url: &str, key_id: &str) -> Result<jwk::JsonWebKey, KeyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let chains = [platform_key_chain(), tool_key_chain()];
        KeySet::from_key_chains(&chains)
            .find(key_id)
            .cloned()
            .ok_or_else(|| KeyError::KeyNotFound {
                url: jwks_url.to_owned(),
                kid: key_id.to_owned(),
            })
    }
}

/// Registration store that is always down.
pub struct FailingRegistrationRepository;

impl RegistrationRepository for FailingRegistrationRepository {
    fn find(&self, _: &str) -> Result<Option<Registration>, RepositoryError> {
        Err(RepositoryError::new("generic error"))
    }

    fn find_all(&self) -> Result<Vec<Registration>, RepositoryError> {
        Err(RepositoryError::new("generic error"))
    }

    fn find_by_platform_issuer(
        &self,
        _: &str,
        _: &str,
    ) -> Result<Option<Registration>, RepositoryError> {
        Err(RepositoryError::new("generic error"))
    }
}
