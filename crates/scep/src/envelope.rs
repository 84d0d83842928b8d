//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! CMS EnvelopedData codec for the inner pkiMessage content.
//!
//! Content is encrypted for a single key-transport recipient identified by
//! IssuerAndSerialNumber, with the content-encryption key wrapped under the
//! recipient's RSA public key (PKCS#1 v1.5 key transport, as SCEP peers use).
//!
//! The encoder round-trips whatever the peer negotiated: DES-EDE3-CBC is the
//! default, DES-CBC is accepted for legacy clients, AES-CBC for modern ones.

use crate::asn1::issuer_and_serial;
use crate::crypto::public_key_from_cert;
use crate::error::{ScepError, ScepResult};
use crate::oid;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::enveloped_data::{
    EnvelopedData, KeyTransRecipientInfo, RecipientIdentifier, RecipientInfo, RecipientInfos,
};
use cms::enveloped_data::EncryptedContentInfo;
use der::asn1::{ObjectIdentifier, OctetString, SetOfVec};
use der::{Any, Decode, Encode};
use rand::{CryptoRng, RngCore};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

type Des3CbcEnc = cbc::Encryptor<des::TdesEde3>;
type Des3CbcDec = cbc::Decryptor<des::TdesEde3>;
type DesCbcEnc = cbc::Encryptor<des::Des>;
type DesCbcDec = cbc::Decryptor<des::Des>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Content-encryption algorithm for the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAlgorithm {
    /// Legacy single DES; decrypt-side interop only.
    DesCbc,
    DesEde3Cbc,
    Aes128Cbc,
    Aes256Cbc,
}

impl ContentAlgorithm {
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            ContentAlgorithm::DesCbc => oid::DES_CBC,
            ContentAlgorithm::DesEde3Cbc => oid::DES_EDE3_CBC,
            ContentAlgorithm::Aes128Cbc => oid::AES_128_CBC,
            ContentAlgorithm::Aes256Cbc => oid::AES_256_CBC,
        }
    }

    pub fn from_oid(value: &ObjectIdentifier) -> Option<Self> {
        if *value == oid::DES_CBC {
            Some(ContentAlgorithm::DesCbc)
        } else if *value == oid::DES_EDE3_CBC {
            Some(ContentAlgorithm::DesEde3Cbc)
        } else if *value == oid::AES_128_CBC {
            Some(ContentAlgorithm::Aes128Cbc)
        } else if *value == oid::AES_256_CBC {
            Some(ContentAlgorithm::Aes256Cbc)
        } else {
            None
        }
    }

    fn key_len(self) -> usize {
        match self {
            ContentAlgorithm::DesCbc => 8,
            ContentAlgorithm::DesEde3Cbc => 24,
            ContentAlgorithm::Aes128Cbc => 16,
            ContentAlgorithm::Aes256Cbc => 32,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            ContentAlgorithm::DesCbc | ContentAlgorithm::DesEde3Cbc => 8,
            ContentAlgorithm::Aes128Cbc | ContentAlgorithm::Aes256Cbc => 16,
        }
    }
}

/// Encrypt `content` for the holder of `recipient`, returning the DER of the
/// ContentInfo-wrapped EnvelopedData.
pub fn encrypt(
    recipient: &Certificate,
    content: &[u8],
    algorithm: ContentAlgorithm,
    rng: &mut (impl RngCore + CryptoRng),
) -> ScepResult<Vec<u8>> {
    let mut cek = vec![0u8; algorithm.key_len()];
    rng.fill_bytes(&mut cek);
    let mut iv = vec![0u8; algorithm.iv_len()];
    rng.fill_bytes(&mut iv);

    let ciphertext = cbc_encrypt(algorithm, &cek, &iv, content)?;

    let recipient_key = public_key_from_cert(recipient)?;
    let wrapped_cek = recipient_key
        .encrypt(rng, Pkcs1v15Encrypt, &cek)
        .map_err(|e| ScepError::internal("CEK wrap", e))?;

    let ktri = KeyTransRecipientInfo {
        version: CmsVersion::V0,
        rid: RecipientIdentifier::IssuerAndSerialNumber(issuer_and_serial(recipient)),
        key_enc_alg: AlgorithmIdentifierOwned {
            oid: oid::RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        enc_key: OctetString::new(wrapped_cek)
            .map_err(|e| ScepError::internal("encrypted key", e))?,
    };

    let mut recipients = SetOfVec::new();
    recipients
        .insert(RecipientInfo::Ktri(ktri))
        .map_err(|e| ScepError::internal("recipient set", e))?;

    let iv_param = Any::encode_from(
        &OctetString::new(iv).map_err(|e| ScepError::internal("IV", e))?,
    )
    .map_err(|e| ScepError::internal("IV parameter", e))?;

    let enveloped = EnvelopedData {
        version: CmsVersion::V0,
        originator_info: None,
        recip_infos: RecipientInfos(recipients),
        encrypted_content: EncryptedContentInfo {
            content_type: oid::ID_DATA,
            content_enc_alg: AlgorithmIdentifierOwned {
                oid: algorithm.oid(),
                parameters: Some(iv_param),
            },
            encrypted_content: Some(
                OctetString::new(ciphertext)
                    .map_err(|e| ScepError::internal("encrypted content", e))?,
            ),
        },
        unprotected_attrs: None,
    };

    let content_info = ContentInfo {
        content_type: oid::ID_ENVELOPED_DATA,
        content: Any::encode_from(&enveloped)
            .map_err(|e| ScepError::internal("EnvelopedData wrap", e))?,
    };
    content_info
        .to_der()
        .map_err(|e| ScepError::internal("EnvelopedData encode", e))
}

/// Decrypt an EnvelopedData addressed to `recipient_cert`/`recipient_key`.
///
/// Accepts both ContentInfo-wrapped and bare EnvelopedData encodings, which
/// both occur in the wild.
pub fn decrypt(
    recipient_cert: &Certificate,
    recipient_key: &RsaPrivateKey,
    bytes: &[u8],
) -> ScepResult<Vec<u8>> {
    let enveloped = parse_enveloped(bytes)?;

    let our_id = issuer_and_serial(recipient_cert);
    let our_id_der = our_id
        .to_der()
        .map_err(|e| ScepError::decoding("recipient id", e))?;

    let ktri = enveloped
        .recip_infos
        .0
        .iter()
        .find_map(|ri| match ri {
            RecipientInfo::Ktri(ktri) => match &ktri.rid {
                RecipientIdentifier::IssuerAndSerialNumber(iasn) => {
                    (iasn.to_der().ok()? == our_id_der).then_some(ktri)
                }
                RecipientIdentifier::SubjectKeyIdentifier(_) => None,
            },
            _ => None,
        })
        .ok_or_else(|| {
            ScepError::MessageDecoding("no recipient matches the server decryption key".into())
        })?;

    let cek = recipient_key
        .decrypt(Pkcs1v15Encrypt, ktri.enc_key.as_bytes())
        .map_err(|e| ScepError::decoding("CEK unwrap", e))?;

    let eci = &enveloped.encrypted_content;
    let algorithm = ContentAlgorithm::from_oid(&eci.content_enc_alg.oid).ok_or_else(|| {
        ScepError::MessageDecoding(format!(
            "unsupported content encryption algorithm {}",
            eci.content_enc_alg.oid
        ))
    })?;
    let iv = eci
        .content_enc_alg
        .parameters
        .as_ref()
        .ok_or_else(|| ScepError::MessageDecoding("missing IV parameter".into()))?
        .decode_as::<OctetString>()
        .map_err(|e| ScepError::decoding("IV parameter", e))?;
    let ciphertext = eci
        .encrypted_content
        .as_ref()
        .ok_or_else(|| ScepError::MessageDecoding("missing encrypted content".into()))?;

    cbc_decrypt(algorithm, &cek, iv.as_bytes(), ciphertext.as_bytes())
}

fn parse_enveloped(bytes: &[u8]) -> ScepResult<EnvelopedData> {
    if let Ok(content_info) = ContentInfo::from_der(bytes) {
        if content_info.content_type == oid::ID_ENVELOPED_DATA {
            return content_info
                .content
                .decode_as::<EnvelopedData>()
                .map_err(|e| ScepError::decoding("EnvelopedData", e));
        }
        return Err(ScepError::MessageDecoding(format!(
            "expected envelopedData, got {}",
            content_info.content_type
        )));
    }
    EnvelopedData::from_der(bytes).map_err(|e| ScepError::decoding("EnvelopedData", e))
}

fn cbc_encrypt(
    algorithm: ContentAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> ScepResult<Vec<u8>> {
    let bad_key = |e: cbc::cipher::InvalidLength| ScepError::internal("cipher key", e);
    Ok(match algorithm {
        ContentAlgorithm::DesCbc => DesCbcEnc::new_from_slices(key, iv)
            .map_err(bad_key)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        ContentAlgorithm::DesEde3Cbc => Des3CbcEnc::new_from_slices(key, iv)
            .map_err(bad_key)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        ContentAlgorithm::Aes128Cbc => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(bad_key)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        ContentAlgorithm::Aes256Cbc => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(bad_key)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    })
}

fn cbc_decrypt(
    algorithm: ContentAlgorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> ScepResult<Vec<u8>> {
    let bad_key = |e: cbc::cipher::InvalidLength| ScepError::decoding("cipher key", e);
    let bad_pad = |_| ScepError::MessageDecoding("decryption produced invalid padding".into());
    match algorithm {
        ContentAlgorithm::DesCbc => DesCbcDec::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(bad_pad),
        ContentAlgorithm::DesEde3Cbc => Des3CbcDec::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(bad_pad),
        ContentAlgorithm::Aes128Cbc => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(bad_pad),
        ContentAlgorithm::Aes256Cbc => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(bad_pad),
    }
}
