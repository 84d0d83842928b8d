//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! RSA and digest primitives shared by the message codec.
//!
//! SCEP peers sign with RSA PKCS#1 v1.5. The server always signs replies with
//! SHA-256; on verify it dispatches on the digest algorithm the client chose
//! (SHA-1, SHA-256, or SHA-512 per the advertised capabilities).

use crate::error::{ScepError, ScepResult};
use crate::oid;
use der::asn1::ObjectIdentifier;
use der::Encode;
use rsa::pkcs8::DecodePublicKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use x509_cert::Certificate;

/// Extract the RSA public key from a certificate's SubjectPublicKeyInfo.
pub fn public_key_from_cert(cert: &Certificate) -> ScepResult<RsaPublicKey> {
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| ScepError::decoding("SPKI encode", e))?;
    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| ScepError::decoding("signer key is not RSA", e))
}

/// Hash `data` with the digest named by `alg`.
pub fn digest(alg: &ObjectIdentifier, data: &[u8]) -> ScepResult<Vec<u8>> {
    if *alg == oid::ID_SHA1 {
        Ok(Sha1::digest(data).to_vec())
    } else if *alg == oid::ID_SHA256 {
        Ok(Sha256::digest(data).to_vec())
    } else if *alg == oid::ID_SHA512 {
        Ok(Sha512::digest(data).to_vec())
    } else {
        Err(ScepError::MessageDecoding(format!(
            "unsupported digest algorithm {alg}"
        )))
    }
}

/// Verify a PKCS#1 v1.5 signature over `message`, hashing with `digest_alg`.
pub fn verify_signature(
    public_key: &RsaPublicKey,
    digest_alg: &ObjectIdentifier,
    message: &[u8],
    signature: &[u8],
) -> ScepResult<()> {
    let signature = Signature::try_from(signature)
        .map_err(|e| ScepError::decoding("signature value", e))?;
    let verified = if *digest_alg == oid::ID_SHA1 {
        VerifyingKey::<Sha1>::new(public_key.clone()).verify(message, &signature)
    } else if *digest_alg == oid::ID_SHA256 {
        VerifyingKey::<Sha256>::new(public_key.clone()).verify(message, &signature)
    } else if *digest_alg == oid::ID_SHA512 {
        VerifyingKey::<Sha512>::new(public_key.clone()).verify(message, &signature)
    } else {
        return Err(ScepError::MessageDecoding(format!(
            "unsupported digest algorithm {digest_alg}"
        )));
    };
    verified.map_err(|_| ScepError::MessageDecoding("signature verification failed".into()))
}

/// Sign `message` with RSA PKCS#1 v1.5 over SHA-256.
pub fn sign_sha256(key: &RsaPrivateKey, message: &[u8]) -> ScepResult<Vec<u8>> {
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key
        .try_sign(message)
        .map_err(|e| ScepError::internal("RSA signing", e))?;
    Ok(signature.to_vec())
}
